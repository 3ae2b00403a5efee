//! Message bus shared by all modules.
//!
//! Three unbounded queues fan in from every module to the dispatcher.
//! Modules only ever hold the sending side; the receiving side is handed
//! to the dispatcher once, when the connector starts.

use crate::messages::{ErrorMessage, LocationMessage, ObservationMessage};
use tokio::sync::mpsc;
use tracing::warn;

/// Sending side of the bus. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MessageBus {
    observations: mpsc::UnboundedSender<ObservationMessage>,
    locations: mpsc::UnboundedSender<LocationMessage>,
    errors: mpsc::UnboundedSender<ErrorMessage>,
}

/// Receiving side of the bus, consumed by the dispatcher.
#[derive(Debug)]
pub struct BusReceivers {
    pub observations: mpsc::UnboundedReceiver<ObservationMessage>,
    pub locations: mpsc::UnboundedReceiver<LocationMessage>,
    pub errors: mpsc::UnboundedReceiver<ErrorMessage>,
}

impl MessageBus {
    /// Creates the three queues.
    pub fn new() -> (Self, BusReceivers) {
        let (obs_tx, obs_rx) = mpsc::unbounded_channel();
        let (loc_tx, loc_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();

        (
            Self {
                observations: obs_tx,
                locations: loc_tx,
                errors: err_tx,
            },
            BusReceivers {
                observations: obs_rx,
                locations: loc_rx,
                errors: err_rx,
            },
        )
    }

    /// Queues an observation. Returns false if the dispatcher is gone.
    pub fn send_observation(&self, msg: ObservationMessage) -> bool {
        match self.observations.send(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "[Bus] Observation queue closed, dropping message from module {}",
                    e.0.module_id
                );
                false
            }
        }
    }

    /// Queues a location. Returns false if the dispatcher is gone.
    pub fn send_location(&self, msg: LocationMessage) -> bool {
        match self.locations.send(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "[Bus] Location queue closed, dropping message from module {}",
                    e.0.module_id
                );
                false
            }
        }
    }

    /// Queues an error. Returns false if the dispatcher is gone.
    pub fn send_error(&self, msg: ErrorMessage) -> bool {
        match self.errors.send(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "[Bus] Error queue closed, dropping error from module {}: {}",
                    e.0.module_id, e.0.error
                );
                false
            }
        }
    }
}
