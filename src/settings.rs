//! Persisted last-used settings.
//!
//! A flat JSON key-value file holding the last URL, output directory, and
//! file-type filter. The CLI loads it at startup and saves it at shutdown;
//! the extractor and the engine never touch it. A missing or corrupt file
//! degrades to defaults instead of failing startup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Default settings file name, next to the working directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Error saving settings. Loading never fails; see [`Settings::load`].
#[derive(Debug, Error)]
#[error("failed to save settings to {path}: {source}")]
pub struct SettingsError {
    /// Path that failed.
    pub path: String,
    /// The underlying IO error.
    #[source]
    pub source: std::io::Error,
}

/// Last-used values restored on the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Last page URL searched.
    pub last_url: String,
    /// Last destination directory.
    pub last_output_directory: String,
    /// Last extension filter, e.g. ".pdf".
    pub last_file_type: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            last_url: String::new(),
            last_output_directory: String::new(),
            last_file_type: ".pdf".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings, returning defaults when the file is missing or
    /// unreadable. Corrupt settings are not worth failing startup over.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no settings file, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(settings) => {
                debug!(path = %path.display(), "loaded settings");
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt settings file, using defaults");
                Self::default()
            }
        }
    }

    /// Saves settings as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError {
                path: path.display().to_string(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string());
        std::fs::write(path, text).map_err(|source| SettingsError {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "saved settings");
        Ok(())
    }
}
