//! Core domain types used throughout the connector.

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of identifiers generated for modules that did not configure one.
pub const GENERATED_ID_LENGTH: usize = 8;

/// Module identifier - uniquely identifies a loaded module.
///
/// An empty identifier means the module has not been assigned one yet; the
/// loader replaces it with a generated one before registration.
///
/// # Example
/// ```
/// use stc_common::ModuleID;
///
/// let module_id = ModuleID::from("w1");
/// assert_eq!(module_id.as_str(), "w1");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleID(String);

impl ModuleID {
    /// Creates a new ModuleID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random alphanumeric identifier of the given length.
    pub fn random(len: usize) -> Self {
        let id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Returns the module ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if no identifier has been assigned.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ModuleID {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModuleID {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ModuleID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
