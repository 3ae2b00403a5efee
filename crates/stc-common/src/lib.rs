//! # STC Common
//!
//! Common types and errors shared across the SensorThings connector.
//!
//! This crate provides the foundational pieces every other connector crate
//! builds upon: the error type, the `Result` alias, and module identifiers.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{Error, Result};
pub use types::{ModuleID, GENERATED_ID_LENGTH};
