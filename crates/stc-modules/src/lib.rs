//! # STC Modules
//!
//! Data-source modules compiled into the connector. Each module registers a
//! factory under the file stem of its artifact, so `foobot.so` in the module
//! path loads [`foobot::FoobotModule`].

pub mod foobot;

use stc_module_api::{FactoryRegistry, Module};
use tracing::debug;

pub use foobot::FoobotModule;

/// Registers every bundled module factory.
pub fn register_all(factories: &FactoryRegistry) {
    factories.register(foobot::FACTORY_NAME, || {
        Ok(Box::new(FoobotModule::new()) as Box<dyn Module>)
    });
    debug!("[Modules] Registered bundled factories: {:?}", factories.names());
}
