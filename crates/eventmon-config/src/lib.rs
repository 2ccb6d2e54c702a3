#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Configuration for eventmon.
//!
//! A single TOML file with `[recorder]` and `[logging]` sections, a few
//! `EVENTMON_*` environment overrides, and range validation.
//!
//! # Usage
//!
//! ```rust,no_run
//! use eventmon_config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("history: {}", config.recorder.history_path().unwrap().display());
//! ```
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`EVENTMON_HISTORY_FILE`,
//!    `EVENTMON_RETENTION_DAYS`, `EVENTMON_LOG_LEVEL`)
//! 2. **Config file** (`--config PATH`, else `<config_dir>/eventmon/config.toml`)
//! 3. **Built-in defaults**
//!
//! # Design
//!
//! This crate has no dependencies on other eventmon crates. The binary
//! converts these types into recorder and logging settings.

/// Environment variable overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load configuration from `path`, or the per-user default location,
    /// with environment overrides applied.
    ///
    /// See [`loader::load`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the config file is malformed or the
    /// final configuration fails validation.
    pub fn load(path: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(path)
    }

    /// Load configuration from a single file, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
