//! Engine and extractor configuration.
//!
//! One [`Config`] value is constructed at startup (defaults, then an optional
//! JSON config file, then CLI flags) and injected into both components.
//! Nothing in the library reads process-wide mutable state.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default number of simultaneous downloads.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default streaming chunk size (16 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Largest accepted chunk size (1 MiB).
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Errors from config validation or file handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field is outside its valid range.
    #[error("invalid config value for `{field}`: {detail}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        detail: String,
    },

    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for this schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            detail: detail.into(),
        }
    }
}

/// Injected configuration consumed by the extractor and the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lower bound of the randomized pre-attempt delay, in seconds.
    pub delay_min_secs: f64,
    /// Upper bound of the randomized pre-attempt delay, in seconds.
    pub delay_max_secs: f64,
    /// Maximum attempts per request, including the first (shared by page
    /// fetches and downloads).
    pub retry_attempts: u32,
    /// Streaming buffer size in bytes.
    pub chunk_size: usize,
    /// Maximum simultaneous downloads.
    pub concurrency: usize,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout in seconds (generous for large files).
    pub read_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay_min_secs: 1.0,
            delay_max_secs: 3.0,
            retry_attempts: 3,
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout_secs: 30,
            read_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Validates field ranges; call after merging file and CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::invalid(
                "concurrency",
                format!(
                    "{} is outside {MIN_CONCURRENCY}..={MAX_CONCURRENCY}",
                    self.concurrency
                ),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::invalid("retry_attempts", "must be at least 1"));
        }
        if !self.delay_min_secs.is_finite() || self.delay_min_secs < 0.0 {
            return Err(ConfigError::invalid(
                "delay_min_secs",
                format!("{} is not a non-negative number", self.delay_min_secs),
            ));
        }
        if !self.delay_max_secs.is_finite() || self.delay_max_secs < self.delay_min_secs {
            return Err(ConfigError::invalid(
                "delay_max_secs",
                format!(
                    "{} is below delay_min_secs ({})",
                    self.delay_max_secs, self.delay_min_secs
                ),
            ));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::invalid(
                "chunk_size",
                format!("{} is outside 1..={MAX_CHUNK_SIZE}", self.chunk_size),
            ));
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "connect_timeout_secs",
                "timeouts must be at least 1 second",
            ));
        }
        Ok(())
    }

    /// Loads configuration from a JSON file, returning defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] when the file
    /// exists but cannot be used; a present-but-broken config file should be
    /// fixed, not silently ignored.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Saves configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] on IO failure (creating parent
    /// directories or writing the file).
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })
    }

    /// The configured connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// The configured read timeout as a [`Duration`].
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// The randomized-delay bounds as [`Duration`]s.
    #[must_use]
    pub fn delay_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_secs_f64(self.delay_min_secs),
            Duration::from_secs_f64(self.delay_max_secs),
        )
    }
}
