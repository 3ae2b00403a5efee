//! Module settings files.
//!
//! Each artifact may have a JSON settings file next to it with the same
//! stem: `modules/foobot.so` reads `modules/foobot.json`. The file is decoded
//! into the module's own settings type. Two optional top-level keys are
//! understood by the connector itself:
//!
//! ```json
//! { "moduleId": "w1", "allowDuplicateResultValues": false, "...": "module settings" }
//! ```

use serde::de::DeserializeOwned;
use serde::Deserialize;
use stc_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Connector-level keys probed from every settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsProbe {
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    pub allow_duplicate_result_values: Option<bool>,
}

/// Returns the settings file path for an artifact.
pub fn settings_path(artifact_path: &Path) -> PathBuf {
    artifact_path.with_extension("json")
}

/// Reads and decodes a settings file.
///
/// Fails if the file cannot be read or does not decode into `T`. A probe
/// that does not decode is treated as empty.
pub fn read_settings<T: DeserializeOwned>(path: &Path) -> Result<(T, SettingsProbe)> {
    let shown = path.display().to_string();
    debug!("[Settings] Reading module settings from {}", shown);

    let source = std::fs::read(path).map_err(|e| Error::settings(&shown, e.to_string()))?;
    let settings: T =
        serde_json::from_slice(&source).map_err(|e| Error::settings(&shown, e.to_string()))?;
    let probe = serde_json::from_slice::<SettingsProbe>(&source).unwrap_or_default();

    Ok((settings, probe))
}
