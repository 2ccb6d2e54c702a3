//! Config file discovery and loading.
//!
//! `load()`:
//! 1. Read the explicit config file, or `<config_dir>/eventmon/config.toml`
//!    if it exists, or start from defaults
//! 2. Apply `EVENTMON_*` environment overrides
//! 3. Validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_overrides, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load the configuration.
///
/// An explicit `path` must exist. Without one, the per-user config file is
/// used when present and defaults otherwise.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a config file cannot be read or parsed, an
/// environment override is malformed, or the result fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
    load_with_env(path, default_config_path().as_deref(), &collect_env_vars())
}

/// [`load`] with an explicit fallback location and environment.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env(
    path: Option<&Path>,
    fallback: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<Config> {
    let mut config = if let Some(path) = path {
        let config = parse_file(path)?;
        info!(path = %path.display(), "loaded config");
        config
    } else if let Some(fallback) = fallback {
        if let Some(config) = try_parse_file(fallback)? {
            info!(path = %fallback.display(), "loaded user config");
            config
        } else {
            Config::default()
        }
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config, env_vars)?;
    validate::validate(&config)?;
    Ok(config)
}

/// Load a config from a specific file path, without environment overrides.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let config = parse_file(path)?;
    validate::validate(&config)?;
    Ok(config)
}

/// `<config_dir>/eventmon/config.toml` for the current user.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("eventmon").join("config.toml"))
}

fn parse_file(path: &Path) -> ConfigResult<Config> {
    // Check file size before reading to prevent OOM.
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(too_large(path, metadata.len()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_str(path, &content)
}

/// Parse a file, returning `None` if it doesn't exist.
///
/// A single read, with the size checked afterwards, so there is no window
/// between a stat and the read.
fn try_parse_file(path: &Path) -> ConfigResult<Option<Config>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    let len = u64::try_from(content.len()).unwrap_or(u64::MAX);
    if len > MAX_CONFIG_FILE_SIZE {
        return Err(too_large(path, len));
    }
    parse_str(path, &content).map(Some)
}

fn parse_str(path: &Path, content: &str) -> ConfigResult<Config> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })
}

fn too_large(path: &Path, len: u64) -> ConfigError {
    ConfigError::ValidationError {
        field: path.display().to_string(),
        message: format!(
            "config file is {len} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit"
        ),
    }
}
