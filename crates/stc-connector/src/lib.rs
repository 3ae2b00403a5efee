//! # STC Connector
//!
//! The connector runtime:
//!
//! - [`loader`]: discovers module artifacts and binds them to registered factories
//! - [`registry`]: concurrent map owning every loaded module
//! - [`lifecycle`]: start and stop, single and bulk
//! - [`dispatcher`]: drains the message bus into the sink and module status records
//! - [`sink`]: HTTP delivery to the SensorThings server
//! - [`api`] and [`server`]: the control API
//! - [`reporter`]: periodic status logging
//! - [`connector`]: wires everything together

pub mod api;
pub mod config;
pub mod connector;
pub mod dispatcher;
pub mod lifecycle;
pub mod loader;
pub mod registry;
pub mod reporter;
pub mod server;
pub mod sink;

// Re-export commonly used items
pub use api::{create_router, ApiState, ModuleState};
pub use config::{Config, ConnectorConfig, LoggingConfig, StatusConfig};
pub use connector::{Connector, NAME, VERSION};
pub use dispatcher::Dispatcher;
pub use lifecycle::{start_module, stop_module, LifecycleManager};
pub use loader::{discover_artifacts, register_modules, DummyModule, LoadedModule, ModuleLoader};
pub use registry::{ModuleHandle, ModuleRegistry};
pub use server::ControlServer;
pub use sink::SinkClient;
