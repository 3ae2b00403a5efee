//! Common module behavior, held by composition.
//!
//! [`ModuleBase`] stores identity, endpoints and the bound [`ModuleData`].
//! Background tasks spawned by a module cannot borrow the module itself, so
//! the send helpers live on [`ModuleSender`], a cheap clonable handle taken
//! from the base once the module data is bound.

use crate::endpoint::Endpoint;
use crate::messages::{Completion, ErrorMessage, LocationMessage, ObservationMessage};
use crate::models::{Location, Observation};
use crate::module_data::ModuleData;
use crate::settings::read_settings;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use stc_common::{Error, ModuleID, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Latest published result per host and datastream.
#[derive(Debug)]
struct PublishState {
    allow_duplicates: bool,
    latest: HashMap<String, HashMap<String, String>>,
}

impl Default for PublishState {
    fn default() -> Self {
        Self {
            allow_duplicates: true,
            latest: HashMap::new(),
        }
    }
}

/// Identity, endpoints and connector bindings of a module.
#[derive(Debug, Default)]
pub struct ModuleBase {
    id: ModuleID,
    name: String,
    description: String,
    endpoints: Vec<Endpoint>,
    data: Option<Arc<ModuleData>>,
    publish: Arc<Mutex<PublishState>>,
}

impl ModuleBase {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &ModuleID {
        &self.id
    }

    pub fn set_id(&mut self, id: ModuleID) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn set_endpoints(&mut self, endpoints: Vec<Endpoint>) {
        self.endpoints = endpoints;
    }

    pub fn module_data(&self) -> Option<&Arc<ModuleData>> {
        self.data.as_ref()
    }

    /// Binds the connector data and resets duplicate tracking.
    pub fn set_module_data(&mut self, data: Arc<ModuleData>) {
        self.data = Some(data);
        *self.publish.lock() = PublishState::default();
    }

    pub fn allow_duplicate_results(&self) -> bool {
        self.publish.lock().allow_duplicates
    }

    pub fn set_allow_duplicate_results(&mut self, allow: bool) {
        self.publish.lock().allow_duplicates = allow;
    }

    /// Handle for sending messages, available once the module data is bound.
    ///
    /// The handle captures the current module ID, so take it after `setup()`
    /// has settled the ID (typically in `start()`).
    pub fn sender(&self) -> Option<ModuleSender> {
        self.data.as_ref().map(|data| ModuleSender {
            module_id: self.id.clone(),
            data: Arc::clone(data),
            publish: Arc::clone(&self.publish),
        })
    }

    /// Sends an error for this module. See [`ModuleSender::send_error`].
    pub fn send_error(&self, error: Error, fatal: bool) {
        match self.sender() {
            Some(sender) => sender.send_error(error, fatal),
            None => warn!(
                "[Module] {} raised an error before module data was bound: {}",
                self.name, error
            ),
        }
    }

    /// Reads the module's settings file and applies the connector-level keys.
    ///
    /// A `moduleId` in the file overrides the module ID, and
    /// `allowDuplicateResultValues` toggles duplicate suppression.
    pub fn load_settings<T: DeserializeOwned>(&mut self) -> Result<T> {
        let path = self
            .data
            .as_ref()
            .map(|data| data.settings_path())
            .ok_or_else(|| Error::Internal("module data not bound".to_string()))?;

        let (settings, probe) = read_settings::<T>(&path)?;

        if let Some(id) = probe.module_id.filter(|id| !id.is_empty()) {
            debug!("[Module] Settings assign module ID {}", id);
            self.id = ModuleID::from(id);
        }
        if let Some(allow) = probe.allow_duplicate_result_values {
            self.set_allow_duplicate_results(allow);
        }

        Ok(settings)
    }
}

/// Clonable handle a module uses to push messages onto the bus.
#[derive(Debug, Clone)]
pub struct ModuleSender {
    module_id: ModuleID,
    data: Arc<ModuleData>,
    publish: Arc<Mutex<PublishState>>,
}

impl ModuleSender {
    pub fn module_id(&self) -> &ModuleID {
        &self.module_id
    }

    pub fn module_data(&self) -> &Arc<ModuleData> {
        &self.data
    }

    /// Sends an error to the connector.
    ///
    /// A fatal error also marks the status fatal right away, so a start
    /// racing with the dispatcher is refused. Before an ID is assigned the
    /// dispatcher cannot route the message, so the error is logged directly.
    pub fn send_error(&self, error: Error, fatal: bool) {
        if fatal {
            self.data.with_status(|status| status.mark_fatal());
        }
        if self.module_id.is_empty() {
            debug!(
                "[Module] {} has no ID yet, recording error locally",
                self.data.file_name()
            );
            self.data.add_error(&error);
            return;
        }
        self.data
            .bus()
            .send_error(ErrorMessage::new(self.module_id.clone(), error, fatal));
    }

    /// Queues an observation for `Datastreams({datastream_id})`.
    ///
    /// Returns false when the value repeats the previous result for the same
    /// host and datastream and duplicates are not allowed.
    pub fn send_observation(
        &self,
        host: &str,
        datastream_id: &str,
        observation: Observation,
    ) -> bool {
        let result = observation.result_key();
        {
            let mut publish = self.publish.lock();
            self.data.with_status(|status| status.record_get(Utc::now()));

            let allow_duplicates = publish.allow_duplicates;
            let per_host = publish.latest.entry(host.to_string()).or_default();
            if !allow_duplicates && per_host.get(datastream_id) == Some(&result) {
                debug!(
                    "[Module] {} skipping duplicate result for datastream {}",
                    self.module_id, datastream_id
                );
                return false;
            }

            per_host.insert(datastream_id.to_string(), result);
            self.data.with_status(|status| status.record_post(Utc::now()));
        }

        self.data.bus().send_observation(ObservationMessage {
            module_id: self.module_id.clone(),
            host: host.to_string(),
            datastream_id: datastream_id.to_string(),
            observation,
            completion: Completion::new(self.module_id.clone(), Arc::clone(&self.data)),
        })
    }

    /// Queues a location for `Things({thing_id})`.
    pub fn send_location(&self, host: &str, thing_id: &str, location: Location) -> bool {
        self.data.bus().send_location(LocationMessage {
            module_id: self.module_id.clone(),
            host: host.to_string(),
            thing_id: thing_id.to_string(),
            location,
            completion: Completion::new(self.module_id.clone(), Arc::clone(&self.data)),
        })
    }
}
