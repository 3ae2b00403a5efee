//! Per-module bookkeeping owned jointly by a module and the connector.

use crate::bus::MessageBus;
use crate::settings::settings_path;
use crate::status::Status;
use parking_lot::Mutex;
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Data the connector binds to a module once, before `setup()` runs.
///
/// The record is never replaced. The status is mutated in place by the
/// module's helpers, the dispatcher and the control API, always under the
/// module's own lock.
#[derive(Debug)]
pub struct ModuleData {
    file_name: String,
    file_path: PathBuf,
    connector_version: String,
    bus: MessageBus,
    status: Mutex<Status>,
}

impl ModuleData {
    pub fn new(
        connector_version: impl Into<String>,
        file_name: impl Into<String>,
        file_path: impl Into<PathBuf>,
        bus: MessageBus,
        max_errors: usize,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            file_path: file_path.into(),
            connector_version: connector_version.into(),
            bus,
            status: Mutex::new(Status::new(max_errors)),
        }
    }

    /// Artifact file name, e.g. `foobot.so`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Full artifact path.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn connector_version(&self) -> &str {
        &self.connector_version
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Path of the module's JSON settings file, next to the artifact.
    pub fn settings_path(&self) -> PathBuf {
        settings_path(&self.file_path)
    }

    /// Runs `f` with exclusive access to the status record.
    ///
    /// Keep `f` short: the lock is shared with the HTTP API and the dispatcher.
    pub fn with_status<R>(&self, f: impl FnOnce(&mut Status) -> R) -> R {
        let mut status = self.status.lock();
        f(&mut status)
    }

    /// Consistent snapshot of the status record.
    pub fn status(&self) -> Status {
        self.status.lock().clone()
    }

    /// Appends an error to the module's error log.
    pub fn add_error(&self, error: impl Display) {
        let message = error.to_string();
        self.with_status(|status| status.add_error(message));
    }

    pub fn is_fatal(&self) -> bool {
        self.status.lock().fatal()
    }

    pub fn is_running(&self) -> bool {
        self.status.lock().running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_settings_path_next_to_artifact() {
        let (bus, _rx) = MessageBus::new();
        let data = ModuleData::new("1.0", "foobot.so", "/opt/modules/foobot.so", bus, 0);
        assert_eq!(data.settings_path(), PathBuf::from("/opt/modules/foobot.json"));
        assert_eq!(data.file_name(), "foobot.so");
        assert_eq!(data.connector_version(), "1.0");
    }

    #[test]
    fn test_concurrent_error_logging_is_serialized() {
        let (bus, _rx) = MessageBus::new();
        let data = Arc::new(ModuleData::new("1.0", "m.so", "m.so", bus, 1000));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let data = Arc::clone(&data);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        data.add_error(format!("t{t}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let status = data.status();
        assert_eq!(status.error_count(), 800);
        assert_eq!(status.last_errors().count(), 800);
    }
}
