//! Messages carried by the bus from modules to the dispatcher.
//!
//! Observation and location messages own a [`Completion`]. The dispatcher
//! consumes it exactly once after the delivery attempt, which records the
//! outcome on the originating module's status without calling back into
//! module code.

use crate::models::{Location, Observation};
use crate::module_data::ModuleData;
use stc_common::{Error, ModuleID};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// An observation to be posted to `Datastreams({datastream_id})/Observations`.
#[derive(Debug)]
pub struct ObservationMessage {
    pub module_id: ModuleID,
    pub host: String,
    pub datastream_id: String,
    pub observation: Observation,
    pub completion: Completion,
}

/// A location to be posted to `Things({thing_id})/Locations`.
#[derive(Debug)]
pub struct LocationMessage {
    pub module_id: ModuleID,
    pub host: String,
    pub thing_id: String,
    pub location: Location,
    pub completion: Completion,
}

/// An error raised by or on behalf of a module.
#[derive(Debug)]
pub struct ErrorMessage {
    pub module_id: ModuleID,
    pub fatal: bool,
    pub error: Error,
}

impl ErrorMessage {
    pub fn new(module_id: ModuleID, error: Error, fatal: bool) -> Self {
        Self {
            module_id,
            fatal,
            error,
        }
    }
}

/// Result of a single delivery attempt to the downstream sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The sink answered with the expected status.
    Delivered,
    /// The sink answered with an unexpected status.
    Rejected { status: u16, body: String },
    /// The request never produced a response (connect error, timeout, ...).
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => write!(f, "delivered"),
            Self::Rejected { status, body } => write!(f, "status {status}: {body}"),
            Self::Failed(reason) => write!(f, "{reason}"),
        }
    }
}

/// Completion handle for one observation or location delivery.
///
/// `complete` takes `self`, so each message is completed at most once.
pub struct Completion {
    module_id: ModuleID,
    data: Arc<ModuleData>,
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("module_id", &self.module_id)
            .finish_non_exhaustive()
    }
}

impl Completion {
    pub fn new(module_id: ModuleID, data: Arc<ModuleData>) -> Self {
        Self { module_id, data }
    }

    pub fn module_id(&self) -> &ModuleID {
        &self.module_id
    }

    /// Records the delivery outcome on the module's status.
    ///
    /// A failed delivery increments the failure counter and raises a
    /// non-fatal error for the module through the error queue.
    pub fn complete(self, outcome: &DeliveryOutcome) {
        let error = match outcome {
            DeliveryOutcome::Delivered => {
                self.data.with_status(|status| status.record_delivery_ok());
                return;
            }
            DeliveryOutcome::Rejected { body, .. } => Error::delivery(body.clone()),
            DeliveryOutcome::Failed(reason) => Error::delivery(reason.clone()),
        };

        self.data.with_status(|status| status.record_delivery_failed());
        debug!("[Completion] Delivery failed for module {}: {}", self.module_id, outcome);

        self.data
            .bus()
            .send_error(ErrorMessage::new(self.module_id, error, false));
    }
}
