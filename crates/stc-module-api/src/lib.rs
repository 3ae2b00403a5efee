//! # STC Module API
//!
//! Everything a connector module needs to plug into the runtime:
//!
//! - The [`Module`] contract the connector drives (setup, start, stop, identity, endpoints)
//! - [`ModuleData`] and its [`Status`] record, shared between the module and the connector
//! - The [`MessageBus`] carrying observation, location and error messages
//! - [`ModuleBase`], a composable helper providing the common module behavior
//! - SensorThings payload models ([`Observation`], [`Location`])
//! - The [`FactoryRegistry`] that binds module artifacts to compiled-in implementations

pub mod base;
pub mod bus;
pub mod endpoint;
pub mod factory;
pub mod messages;
pub mod models;
pub mod module_data;
pub mod module_trait;
pub mod settings;
pub mod status;

// Re-export commonly used items
pub use base::{ModuleBase, ModuleSender};
pub use bus::{BusReceivers, MessageBus};
pub use endpoint::{Endpoint, EndpointError, EndpointHandler, HttpOperation, Operation};
pub use factory::{global_factories, register_module_factory, FactoryRegistry, ModuleFactoryFn};
pub use messages::{Completion, DeliveryOutcome, ErrorMessage, LocationMessage, ObservationMessage};
pub use models::{FeatureOfInterest, Location, Observation};
pub use module_data::ModuleData;
pub use module_trait::Module;
pub use settings::{read_settings, settings_path, SettingsProbe};
pub use status::{Status, DEFAULT_MAX_ERRORS};
pub use stc_common::{Error, ModuleID, Result};
