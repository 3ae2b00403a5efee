//! Registry of loaded modules.
//!
//! The registry is the sole long-lived owner of every module. Modules are
//! stored behind a [`ModuleHandle`] which caches the identity and endpoints
//! captured at registration, so read paths (`GET /Modules`, error dispatch,
//! control lookups) never wait on a module that is busy starting or stopping.

use dashmap::DashMap;
use stc_common::ModuleID;
use stc_module_api::{Endpoint, Module, ModuleData};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// A registered module.
pub struct ModuleHandle {
    id: ModuleID,
    name: String,
    description: String,
    endpoints: Vec<Endpoint>,
    data: Arc<ModuleData>,
    module: Mutex<Box<dyn Module>>,
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("file_name", &self.data.file_name())
            .finish_non_exhaustive()
    }
}

impl ModuleHandle {
    /// Wraps a module whose ID has been settled.
    pub fn new(module: Box<dyn Module>, data: Arc<ModuleData>) -> Self {
        Self {
            id: module.id(),
            name: module.name(),
            description: module.description(),
            endpoints: module.endpoints(),
            data,
            module: Mutex::new(module),
        }
    }

    pub fn id(&self) -> &ModuleID {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Endpoints as declared by the module, with module-relative paths.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Endpoints with every path prefixed by `/{id}`.
    pub fn prefixed_endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.iter().map(|ep| ep.prefixed(&self.id)).collect()
    }

    pub fn data(&self) -> &Arc<ModuleData> {
        &self.data
    }

    /// Exclusive access to the module for lifecycle calls.
    pub async fn lock(&self) -> MutexGuard<'_, Box<dyn Module>> {
        self.module.lock().await
    }
}

/// Concurrent map of module ID to handle.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: Arc<DashMap<ModuleID, Arc<ModuleHandle>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under its ID.
    ///
    /// A module already registered under the same ID is replaced and returned.
    pub fn insert(&self, handle: ModuleHandle) -> Option<Arc<ModuleHandle>> {
        let id = handle.id().clone();
        let file_name = handle.data().file_name().to_string();
        debug!("[Registry] Registering module {} ({})", id, file_name);

        let previous = self.modules.insert(id.clone(), Arc::new(handle));
        if let Some(ref old) = previous {
            warn!(
                "[Registry] Module ID {} is used by {} and {}, keeping {}",
                id,
                old.data().file_name(),
                file_name,
                file_name
            );
        }
        previous
    }

    pub fn get(&self, id: &ModuleID) -> Option<Arc<ModuleHandle>> {
        self.modules.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &ModuleID) -> bool {
        self.modules.contains_key(id)
    }

    /// All handles, sorted by ID.
    pub fn list(&self) -> Vec<Arc<ModuleHandle>> {
        let mut handles: Vec<Arc<ModuleHandle>> = self
            .modules
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handles.sort_by(|a, b| a.id().cmp(b.id()));
        handles
    }

    pub fn ids(&self) -> Vec<ModuleID> {
        self.list().iter().map(|h| h.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
