//! Configuration types for eventmon.
//!
//! These types do not depend on the recorder crate; the binary converts
//! them into recorder and logging settings at startup. Every struct
//! implements [`Default`], so a bare `[section]` header in TOML produces a
//! working configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Issuance history recorder settings.
    pub recorder: RecorderSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// RecorderSection
// ---------------------------------------------------------------------------

/// Issuance history recorder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSection {
    /// Path of the history file. Defaults to `<data_dir>/eventmon/events.json`.
    pub history_file: Option<PathBuf>,
    /// How long issuance records are kept, in days.
    pub retention_days: u64,
    /// Seconds between expiry sweeps.
    pub expiry_interval_secs: u64,
    /// Quiet period after the last change before the history is saved.
    pub save_debounce_secs: u64,
    /// Capacity of each recorder inbox.
    pub channel_capacity: usize,
    /// Drop users whose history has been emptied by expiry.
    pub remove_empty_histories: bool,
}

impl Default for RecorderSection {
    fn default() -> Self {
        Self {
            history_file: None,
            retention_days: 31,
            expiry_interval_secs: 3600,
            save_debounce_secs: 5,
            channel_capacity: 16,
            remove_empty_histories: false,
        }
    }
}

/// Seconds per day.
const DAY_SECS: u64 = 86_400;

impl RecorderSection {
    /// Retention window.
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(DAY_SECS))
    }

    /// Interval between expiry sweeps.
    #[must_use]
    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_interval_secs)
    }

    /// Save debounce period.
    #[must_use]
    pub fn save_debounce(&self) -> Duration {
        Duration::from_secs(self.save_debounce_secs)
    }

    /// The configured history file, or the per-user default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoDataDir`] if no file is configured and the
    /// platform data directory cannot be determined.
    pub fn history_path(&self) -> ConfigResult<PathBuf> {
        match &self.history_file {
            Some(path) => Ok(path.clone()),
            None => default_history_path(),
        }
    }
}

/// `<data_dir>/eventmon/events.json` for the current user.
///
/// # Errors
///
/// Returns [`ConfigError::NoDataDir`] if the data directory cannot be
/// determined.
pub fn default_history_path() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.data_dir().join("eventmon").join("events.json"))
        .ok_or(ConfigError::NoDataDir)
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["eventmon_recorder=debug"]`).
    pub directives: Vec<String>,
    /// Directory for daily log files. Logs go to stderr when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
            directory: None,
        }
    }
}
