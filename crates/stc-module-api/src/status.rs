//! Per-module status record.
//!
//! A `Status` is only ever mutated through [`ModuleData::with_status`](crate::ModuleData::with_status),
//! which serializes access behind the module's lock. The methods here keep
//! the record's invariants:
//!
//! - `fatal` implies `!running`, and `fatal` is never cleared
//! - the error log holds at most `max_errors` entries, newest first

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Default capacity of a module's error log.
pub const DEFAULT_MAX_ERRORS: usize = 50;

/// Status of a loaded module as exposed by `GET /Modules`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(skip)]
    max_errors: usize,
    fatal: bool,
    running: bool,
    last_get: Option<DateTime<Utc>>,
    last_post: Option<DateTime<Utc>>,
    #[serde(rename = "postSuccess")]
    observations_posted_ok: u64,
    #[serde(rename = "postFailed")]
    observations_posted_failed: u64,
    error_count: u64,
    #[serde(rename = "errors")]
    last_errors: VecDeque<String>,
}

impl Default for Status {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ERRORS)
    }
}

impl Status {
    /// Creates an empty status with the given error log capacity.
    ///
    /// A capacity of zero falls back to [`DEFAULT_MAX_ERRORS`].
    pub fn new(max_errors: usize) -> Self {
        let max_errors = if max_errors == 0 {
            DEFAULT_MAX_ERRORS
        } else {
            max_errors
        };

        Self {
            max_errors,
            fatal: false,
            running: false,
            last_get: None,
            last_post: None,
            observations_posted_ok: 0,
            observations_posted_failed: 0,
            error_count: 0,
            last_errors: VecDeque::with_capacity(max_errors),
        }
    }

    pub fn fatal(&self) -> bool {
        self.fatal
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn last_get(&self) -> Option<DateTime<Utc>> {
        self.last_get
    }

    pub fn last_post(&self) -> Option<DateTime<Utc>> {
        self.last_post
    }

    pub fn observations_posted_ok(&self) -> u64 {
        self.observations_posted_ok
    }

    pub fn observations_posted_failed(&self) -> u64 {
        self.observations_posted_failed
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn max_errors(&self) -> usize {
        self.max_errors
    }

    /// Error log, newest first.
    pub fn last_errors(&self) -> impl Iterator<Item = &str> {
        self.last_errors.iter().map(String::as_str)
    }

    /// Error log as owned strings, newest first.
    pub fn last_errors_vec(&self) -> Vec<String> {
        self.last_errors.iter().cloned().collect()
    }

    /// Prepends an error to the log, dropping the oldest entry past capacity.
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.last_errors.push_front(error.into());
        self.last_errors.truncate(self.max_errors);
        self.error_count += 1;
    }

    /// Moves the module into the terminal fatal state.
    pub fn mark_fatal(&mut self) {
        self.fatal = true;
        self.running = false;
    }

    /// Updates the running flag.
    ///
    /// Returns `false` without changing anything when asked to mark a fatal
    /// module as running.
    pub fn set_running(&mut self, running: bool) -> bool {
        if running && self.fatal {
            return false;
        }
        self.running = running;
        true
    }

    /// Stamps the time of the latest reading handed to the connector.
    pub fn record_get(&mut self, at: DateTime<Utc>) {
        self.last_get = Some(at);
    }

    /// Stamps the time of the latest reading queued for delivery.
    pub fn record_post(&mut self, at: DateTime<Utc>) {
        self.last_post = Some(at);
    }

    pub fn record_delivery_ok(&mut self) {
        self.observations_posted_ok += 1;
    }

    pub fn record_delivery_failed(&mut self) {
        self.observations_posted_failed += 1;
    }
}
