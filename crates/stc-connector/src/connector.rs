//! Connector orchestration.
//!
//! Startup order:
//! 1. Load, set up and register every module artifact
//! 2. Spawn the dispatch loops, which drain anything queued during setup
//! 3. Start all modules when `startModulesOnStartup` is set
//! 4. Start the status reporter when enabled
//!
//! The control server is bound separately with [`Connector::bind`], so a
//! bind failure is reported to the caller after modules were loaded.

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::dispatcher::{Dispatcher, DispatcherTasks};
use crate::lifecycle::LifecycleManager;
use crate::loader::{register_modules, ModuleLoader};
use crate::registry::ModuleRegistry;
use crate::reporter::spawn_status_reporter;
use crate::server::ControlServer;
use crate::sink::SinkClient;
use anyhow::{Context, Result};
use axum::Router;
use chrono::{DateTime, Utc};
use stc_module_api::{FactoryRegistry, MessageBus};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Connector version tag handed to every module.
pub const VERSION: &str = "1.0";

pub const NAME: &str = "sensorthings connector";

/// A running connector.
pub struct Connector {
    config: Config,
    lifecycle: LifecycleManager,
    started: DateTime<Utc>,
    dispatcher: DispatcherTasks,
    reporter: Option<JoinHandle<()>>,
    startup: Option<JoinHandle<()>>,
}

impl Connector {
    /// Loads the modules and starts the background tasks.
    pub async fn start(config: Config, factories: &FactoryRegistry) -> Result<Self> {
        info!("[Connector] Starting {} {}", NAME, VERSION);
        let started = Utc::now();

        let registry = ModuleRegistry::new();
        let (bus, receivers) = MessageBus::new();

        let module_path = config
            .connector
            .resolved_module_path()
            .context("Failed to resolve the module path")?;
        let loader = ModuleLoader::new(factories, bus, VERSION, config.connector.max_errors);
        let loaded = loader.load_all(&module_path).await;
        let ids = register_modules(loaded, &registry);
        info!("[Connector] {} module(s) registered", ids.len());

        let sink = SinkClient::new(config.connector.delivery_timeout())
            .context("Failed to create the sink client")?;
        let dispatcher = Dispatcher::new(registry.clone(), sink).spawn(receivers);

        let lifecycle = LifecycleManager::new(registry.clone());

        let startup = config.connector.start_modules_on_startup.then(|| {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move {
                let failed = lifecycle.start_all_and_wait(true).await;
                if failed.is_empty() {
                    info!("[Connector] ✅ All modules started");
                } else {
                    warn!("[Connector] {} module(s) failed to start", failed.len());
                }
            })
        });

        let reporter = config
            .logging
            .status
            .enabled
            .then(|| spawn_status_reporter(registry, config.logging.status.interval()));

        Ok(Self {
            config,
            lifecycle,
            started,
            dispatcher,
            reporter,
            startup,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        self.lifecycle.registry()
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// Control API router over the registered modules.
    pub fn router(&self) -> Router {
        create_router(ApiState::new(self.lifecycle.clone(), self.started))
    }

    /// Binds the control server to the configured host and port.
    pub async fn bind(&self) -> Result<ControlServer> {
        let connector = &self.config.connector;
        ControlServer::bind(&connector.host, connector.port, self.router())
            .await
            .with_context(|| format!("Failed to start HTTP server on {}", connector.bind_address()))
    }

    /// Waits until the startup auto-start has finished, if one was requested.
    pub async fn wait_for_startup(&mut self) {
        if let Some(startup) = self.startup.take() {
            let _ = startup.await;
        }
    }

    /// Stops every module, then the background tasks.
    pub async fn shutdown(mut self) {
        info!("[Connector] Stopping {}", NAME);

        if let Some(reporter) = self.reporter.take() {
            reporter.abort();
        }
        self.wait_for_startup().await;

        self.lifecycle.stop_all_and_wait().await;
        self.dispatcher.abort();

        info!("[Connector] {} stopped", NAME);
    }
}
