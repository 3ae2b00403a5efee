//! Connector configuration.
//!
//! Read from a JSON file (default `config.json`):
//!
//! ```json
//! {
//!   "connector": {
//!     "host": "0.0.0.0",
//!     "port": 8080,
//!     "startModulesOnStartup": true,
//!     "modulePath": "./modules",
//!     "maxErrors": 50,
//!     "deliveryTimeoutSeconds": 30
//!   },
//!   "logging": {
//!     "level": "info",
//!     "status": { "enabled": true, "intervalSeconds": 3600 }
//!   }
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Status report interval used when none is configured.
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 3600;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub start_modules_on_startup: bool,
    /// Root searched for module artifacts. Defaults to the executable's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_path: Option<PathBuf>,
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,
    /// Timeout for a single delivery to the sink. No timeout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_timeout_seconds: Option<u64>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            start_modules_on_startup: false,
            module_path: None,
            max_errors: default_max_errors(),
            delivery_timeout_seconds: None,
        }
    }
}

impl ConnectorConfig {
    /// Address the control server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn delivery_timeout(&self) -> Option<Duration> {
        self.delivery_timeout_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Module root, falling back to the directory of the running executable.
    pub fn resolved_module_path(&self) -> Result<PathBuf> {
        if let Some(path) = self.module_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            return Ok(path.clone());
        }

        let exe = std::env::current_exe().context("Failed to locate the connector executable")?;
        exe.parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("Executable {} has no parent directory", exe.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub status: StatusConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            status: StatusConfig::default(),
        }
    }
}

/// Periodic status report settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub interval_seconds: u64,
}

impl StatusConfig {
    pub fn interval(&self) -> Duration {
        match self.interval_seconds {
            0 => Duration::from_secs(DEFAULT_STATUS_INTERVAL_SECS),
            secs => Duration::from_secs(secs),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a JSON string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(content).context("Failed to parse JSON configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.connector.port == 0 {
            return Err(anyhow!(
                "Port must be between 1 and 65535, got: {}",
                self.connector.port
            ));
        }

        if self.connector.host.trim().is_empty() {
            return Err(anyhow!("Host cannot be empty"));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(anyhow!(
                "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
                self.logging.level
            )),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_errors() -> usize {
    stc_module_api::DEFAULT_MAX_ERRORS
}

fn default_log_level() -> String {
    "info".to_string()
}
