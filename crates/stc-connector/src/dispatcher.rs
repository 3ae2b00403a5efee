//! Drains the message bus.
//!
//! One loop per queue. Observation and location loops start one delivery
//! task per message, in receive order. The error loop records each error on
//! the owning module and stops modules that report a fatal error.

use crate::lifecycle::fail_module;
use crate::registry::ModuleRegistry;
use crate::sink::SinkClient;
use stc_module_api::{BusReceivers, ErrorMessage, LocationMessage, ObservationMessage};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Routes bus messages to the sink and to module status records.
#[derive(Clone)]
pub struct Dispatcher {
    registry: ModuleRegistry,
    sink: SinkClient,
}

/// Join handles of the three dispatch loops.
pub struct DispatcherTasks {
    pub observations: JoinHandle<()>,
    pub locations: JoinHandle<()>,
    pub errors: JoinHandle<()>,
}

impl DispatcherTasks {
    pub fn abort(&self) {
        self.observations.abort();
        self.locations.abort();
        self.errors.abort();
    }
}

impl Dispatcher {
    pub fn new(registry: ModuleRegistry, sink: SinkClient) -> Self {
        Self { registry, sink }
    }

    /// Spawns the three dispatch loops.
    pub fn spawn(self, receivers: BusReceivers) -> DispatcherTasks {
        let BusReceivers {
            observations,
            locations,
            errors,
        } = receivers;

        info!("[Dispatcher] Listening for observations, locations and errors");
        DispatcherTasks {
            observations: tokio::spawn(run_observations(self.sink.clone(), observations)),
            locations: tokio::spawn(run_locations(self.sink.clone(), locations)),
            errors: tokio::spawn(run_errors(self.registry, errors)),
        }
    }
}

async fn run_observations(sink: SinkClient, mut rx: UnboundedReceiver<ObservationMessage>) {
    while let Some(msg) = rx.recv().await {
        debug!(
            "[Dispatcher] Observation from {} for datastream {}",
            msg.module_id, msg.datastream_id
        );
        let sink = sink.clone();
        tokio::spawn(async move { sink.deliver_observation(msg).await });
    }
    debug!("[Dispatcher] Observation queue closed");
}

async fn run_locations(sink: SinkClient, mut rx: UnboundedReceiver<LocationMessage>) {
    while let Some(msg) = rx.recv().await {
        debug!(
            "[Dispatcher] Location from {} for thing {}",
            msg.module_id, msg.thing_id
        );
        let sink = sink.clone();
        tokio::spawn(async move { sink.deliver_location(msg).await });
    }
    debug!("[Dispatcher] Location queue closed");
}

async fn run_errors(registry: ModuleRegistry, mut rx: UnboundedReceiver<ErrorMessage>) {
    while let Some(msg) = rx.recv().await {
        handle_error(&registry, msg).await;
    }
    debug!("[Dispatcher] Error queue closed");
}

/// Records an error on its module; a fatal error stops the module for good.
///
/// Errors for unknown module IDs are logged and dropped.
pub async fn handle_error(registry: &ModuleRegistry, msg: ErrorMessage) {
    let Some(handle) = registry.get(&msg.module_id) else {
        error!(
            "[Dispatcher] Incoming error from not registered module id {}: {}",
            msg.module_id, msg.error
        );
        return;
    };

    handle.data().add_error(&msg.error);
    error!(
        "[Dispatcher] Module {} error: {}",
        handle.data().file_path().display(),
        msg.error
    );

    if msg.fatal {
        error!("[Dispatcher] Module {} reported a fatal error, stopping it", msg.module_id);
        fail_module(&handle).await;
    }
}
