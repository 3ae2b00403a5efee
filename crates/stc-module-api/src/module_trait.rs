//! The module contract.
//!
//! Every data source the connector hosts implements [`Module`]. Identity,
//! endpoints and the bound [`ModuleData`] live in a [`ModuleBase`] the module
//! owns; the default methods delegate to it, so a typical module only writes
//! `setup`, `start` and `stop`.
//!
//! # Lifecycle
//!
//! 1. The connector binds a fresh `ModuleData` with `set_module_data()`
//! 2. `setup()` reads settings and declares endpoints; an error makes the module fatal
//! 3. `start(is_startup)` begins polling; `is_startup` is true only for the boot auto-start
//! 4. `stop()` halts polling; it must be safe to call on a stopped module
//!
//! Modules report problems through the error queue (see
//! [`ModuleSender::send_error`](crate::ModuleSender::send_error)). A fatal
//! error makes the connector stop the module for good.

use crate::base::ModuleBase;
use crate::endpoint::Endpoint;
use crate::module_data::ModuleData;
use async_trait::async_trait;
use stc_common::{ModuleID, Result};
use std::sync::Arc;

#[async_trait]
pub trait Module: Send + Sync {
    /// Shared module state.
    fn base(&self) -> &ModuleBase;

    /// Shared module state, mutably.
    fn base_mut(&mut self) -> &mut ModuleBase;

    /// Configures the module. Called once, after the module data is bound.
    async fn setup(&mut self) -> Result<()>;

    /// Starts producing data.
    async fn start(&mut self, is_startup: bool) -> Result<()>;

    /// Stops producing data. Must be idempotent.
    async fn stop(&mut self);

    fn id(&self) -> ModuleID {
        self.base().id().clone()
    }

    fn set_id(&mut self, id: ModuleID) {
        self.base_mut().set_id(id);
    }

    fn name(&self) -> String {
        self.base().name().to_string()
    }

    fn description(&self) -> String {
        self.base().description().to_string()
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.base().endpoints().to_vec()
    }

    fn module_data(&self) -> Option<Arc<ModuleData>> {
        self.base().module_data().cloned()
    }

    fn set_module_data(&mut self, data: Arc<ModuleData>) {
        self.base_mut().set_module_data(data);
    }
}
