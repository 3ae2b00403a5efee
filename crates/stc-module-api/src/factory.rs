//! Module factories.
//!
//! Module implementations are compiled into the connector and registered by
//! name. An artifact found in the module directory is bound to the factory
//! registered under its file stem, so `modules/foobot.so` is created by the
//! `foobot` factory.
//!
//! ```rust,ignore
//! register_module_factory("foobot", || Ok(Box::new(FoobotModule::new())));
//! ```

use crate::module_trait::Module;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use stc_common::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Creates a fresh module instance.
pub type ModuleFactoryFn = Arc<dyn Fn() -> Result<Box<dyn Module>> + Send + Sync>;

/// Named set of module factories.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: RwLock<HashMap<String, ModuleFactoryFn>>,
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory. A later registration under the same name wins.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn Module>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("[Factories] Registering module factory: {}", name);
        if self
            .factories
            .write()
            .insert(name.clone(), Arc::new(factory))
            .is_some()
        {
            warn!("[Factories] Factory {} registered twice, keeping the latest", name);
        }
    }

    /// Looks up the factory for `name`. `None` means nothing is exported under that name.
    pub fn get(&self, name: &str) -> Option<ModuleFactoryFn> {
        self.factories.read().get(name).cloned()
    }

    /// Creates a module with the factory registered under `name`.
    pub fn create(&self, name: &str) -> Option<Result<Box<dyn Module>>> {
        self.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

lazy_static! {
    static ref GLOBAL_FACTORIES: FactoryRegistry = FactoryRegistry::new();
}

/// Registers a factory in the process-wide registry.
pub fn register_module_factory<F>(name: impl Into<String>, factory: F)
where
    F: Fn() -> Result<Box<dyn Module>> + Send + Sync + 'static,
{
    GLOBAL_FACTORIES.register(name, factory);
}

/// The process-wide registry.
pub fn global_factories() -> &'static FactoryRegistry {
    &GLOBAL_FACTORIES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::ModuleBase;
    use async_trait::async_trait;
    use stc_common::Error;

    struct NoopModule {
        base: ModuleBase,
    }

    #[async_trait]
    impl Module for NoopModule {
        fn base(&self) -> &ModuleBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ModuleBase {
            &mut self.base
        }

        async fn setup(&mut self) -> Result<()> {
            Ok(())
        }

        async fn start(&mut self, _is_startup: bool) -> Result<()> {
            Ok(())
        }

        async fn stop(&mut self) {}
    }

    #[test]
    fn test_register_and_create() {
        let registry = FactoryRegistry::new();
        registry.register("noop", || {
            Ok(Box::new(NoopModule {
                base: ModuleBase::new("Noop", "does nothing"),
            }) as Box<dyn Module>)
        });

        assert!(registry.contains("noop"));
        let module = registry.create("noop").unwrap().unwrap();
        assert_eq!(module.name(), "Noop");
        assert!(registry.create("missing").is_none());
    }

    #[test]
    fn test_factory_error_is_returned() {
        let registry = FactoryRegistry::new();
        registry.register("broken", || Err(Error::module("cannot build")));
        assert!(registry.create("broken").unwrap().is_err());
    }

    #[test]
    fn test_names_sorted() {
        let registry = FactoryRegistry::new();
        registry.register("b", || Err(Error::module("b")));
        registry.register("a", || Err(Error::module("a")));
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_global_registry() {
        register_module_factory("global-noop-test", || {
            Ok(Box::new(NoopModule {
                base: ModuleBase::new("Noop", ""),
            }) as Box<dyn Module>)
        });
        assert!(global_factories().contains("global-noop-test"));
    }
}
