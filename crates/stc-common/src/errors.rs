//! Error types for the SensorThings connector.
//!
//! Every fallible operation in the library crates returns [`Result<T>`].
//! Errors that end up in a module's error log are rendered with their
//! `Display` implementation, so the messages below are what operators see
//! in `GET /Modules`.

use crate::types::ModuleID;
use thiserror::Error;

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for connector operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A module was not found in the registry.
    #[error("Unable to find module {module_id}")]
    ModuleNotFound { module_id: ModuleID },

    /// A start was requested for a module in the terminal fatal state.
    #[error("module {module_id} not started because it is in 'Fatal' state")]
    ModuleFatal { module_id: ModuleID },

    /// A module artifact could not be opened or does not satisfy the module contract.
    #[error("error loading module {artifact}: {reason}")]
    Load { artifact: String, reason: String },

    /// An error reported by module code (setup, start, polling).
    #[error("{0}")]
    Module(String),

    /// A module settings file could not be read or decoded.
    #[error("error reading settings file {path}: {reason}")]
    Settings { path: String, reason: String },

    /// Delivery to the downstream sink failed.
    #[error("error posting to server: {0}")]
    Delivery(String),

    /// Outbound or inbound HTTP plumbing failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Internal error (shouldn't happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a module not found error.
    pub fn module_not_found(module_id: ModuleID) -> Self {
        Self::ModuleNotFound { module_id }
    }

    /// Creates the error returned when starting a fatal module.
    pub fn module_fatal(module_id: ModuleID) -> Self {
        Self::ModuleFatal { module_id }
    }

    /// Creates a load error for a module artifact.
    pub fn load(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }

    /// Creates an error reported by module code.
    pub fn module(message: impl Into<String>) -> Self {
        Self::Module(message.into())
    }

    /// Creates a settings error.
    pub fn settings(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Settings {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a delivery error carrying the sink's response or the transport failure.
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery(message.into())
    }

    /// Returns true if this error is the fatal-state start refusal.
    pub fn is_fatal_refusal(&self) -> bool {
        matches!(self, Self::ModuleFatal { .. })
    }
}
