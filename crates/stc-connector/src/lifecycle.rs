//! Module lifecycle management.
//!
//! Start and stop may be requested at any time, from the boot sequence, the
//! control API, the error dispatcher or the shutdown path. Calls for the same
//! module are serialized by the module's handle lock; calls for different
//! modules never wait on each other.

use crate::registry::{ModuleHandle, ModuleRegistry};
use stc_common::{Error, ModuleID, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Starts a module.
///
/// Refused without touching the module when the module is fatal. A failing
/// `start()` leaves the module stopped with the error appended to its log.
pub async fn start_module(handle: &ModuleHandle, is_startup: bool) -> Result<()> {
    let data = handle.data();
    if data.is_fatal() {
        return Err(Error::module_fatal(handle.id().clone()));
    }

    let mut module = handle.lock().await;
    if data.is_fatal() {
        return Err(Error::module_fatal(handle.id().clone()));
    }

    debug!("[Lifecycle] Starting module {} (startup: {})", handle.id(), is_startup);
    match module.start(is_startup).await {
        Ok(()) => {
            if data.with_status(|status| status.set_running(true)) {
                info!("[Lifecycle] ✅ Module {} started", handle.id());
                Ok(())
            } else {
                // Went fatal while starting; the error dispatcher stops it.
                warn!("[Lifecycle] Module {} became fatal while starting", handle.id());
                Err(Error::module_fatal(handle.id().clone()))
            }
        }
        Err(e) => {
            error!("[Lifecycle] Module {} failed to start: {}", handle.id(), e);
            data.with_status(|status| {
                status.set_running(false);
                status.add_error(e.to_string());
            });
            Err(e)
        }
    }
}

/// Stops a module. Always calls the module's `stop()`.
pub async fn stop_module(handle: &ModuleHandle) {
    let mut module = handle.lock().await;
    debug!("[Lifecycle] Stopping module {}", handle.id());
    module.stop().await;
    handle.data().with_status(|status| {
        status.set_running(false);
    });
    info!("[Lifecycle] Module {} stopped", handle.id());
}

/// Bulk lifecycle operations over every registered module.
#[derive(Clone)]
pub struct LifecycleManager {
    registry: ModuleRegistry,
}

impl LifecycleManager {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Looks up a module and starts it.
    pub async fn start(&self, id: &ModuleID, is_startup: bool) -> Result<()> {
        let handle = self
            .registry
            .get(id)
            .ok_or_else(|| Error::module_not_found(id.clone()))?;
        start_module(&handle, is_startup).await
    }

    /// Looks up a module and stops it.
    pub async fn stop(&self, id: &ModuleID) -> Result<()> {
        let handle = self
            .registry
            .get(id)
            .ok_or_else(|| Error::module_not_found(id.clone()))?;
        stop_module(&handle).await;
        Ok(())
    }

    /// Spawns one start task per module.
    ///
    /// Dropping the returned set aborts the tasks still running.
    pub fn start_all(&self, is_startup: bool) -> JoinSet<(ModuleID, Result<()>)> {
        let mut tasks = JoinSet::new();
        for handle in self.registry.list() {
            tasks.spawn(async move {
                let result = start_module(&handle, is_startup).await;
                (handle.id().clone(), result)
            });
        }
        tasks
    }

    /// Spawns one stop task per module.
    ///
    /// Dropping the returned set aborts the tasks still running.
    pub fn stop_all(&self) -> JoinSet<ModuleID> {
        let mut tasks = JoinSet::new();
        for handle in self.registry.list() {
            tasks.spawn(async move {
                stop_module(&handle).await;
                handle.id().clone()
            });
        }
        tasks
    }

    /// Starts every module and waits for all of them. Returns the IDs that failed.
    pub async fn start_all_and_wait(&self, is_startup: bool) -> Vec<(ModuleID, Error)> {
        let mut failed = Vec::new();
        let mut tasks = self.start_all(is_startup);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((id, Err(e))) => {
                    warn!("[Lifecycle] Module {} not started: {}", id, e);
                    failed.push((id, e));
                }
                Err(e) => error!("[Lifecycle] Start task failed: {}", e),
            }
        }
        failed
    }

    /// Stops every module and waits for all of them.
    pub async fn stop_all_and_wait(&self) {
        let mut tasks = self.stop_all();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("[Lifecycle] Stop task failed: {}", e);
            }
        }
    }
}

/// Marks a module fatal and stops it.
pub async fn fail_module(handle: &Arc<ModuleHandle>) {
    handle.data().with_status(|status| status.mark_fatal());
    stop_module(handle).await;
}
