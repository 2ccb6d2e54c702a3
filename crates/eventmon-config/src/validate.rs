//! Configuration validation.
//!
//! Checks that deserialized [`Config`](crate::Config) values are within
//! acceptable ranges.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest accepted retention window, in days (ten years).
const MAX_RETENTION_DAYS: u64 = 3650;

/// Longest accepted save debounce, in seconds.
const MAX_SAVE_DEBOUNCE_SECS: u64 = 3600;

/// Largest accepted inbox capacity.
const MAX_CHANNEL_CAPACITY: usize = 65_536;

/// Validate a deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_recorder(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_recorder(config: &Config) -> ConfigResult<()> {
    let r = &config.recorder;

    if let Some(path) = &r.history_file
        && path.as_os_str().is_empty()
    {
        return Err(invalid(
            "recorder.history_file",
            "history_file must not be empty; omit it to use the default location",
        ));
    }

    if r.retention_days == 0 || r.retention_days > MAX_RETENTION_DAYS {
        return Err(invalid(
            "recorder.retention_days",
            format!("retention_days must be between 1 and {MAX_RETENTION_DAYS}"),
        ));
    }

    if r.expiry_interval_secs == 0 {
        return Err(invalid(
            "recorder.expiry_interval_secs",
            "expiry_interval_secs must be greater than 0",
        ));
    }

    if r.expiry_interval() > r.retention() {
        return Err(invalid(
            "recorder.expiry_interval_secs",
            format!(
                "expiry interval of {}s is longer than the {}-day retention window",
                r.expiry_interval_secs, r.retention_days
            ),
        ));
    }

    if r.save_debounce_secs > MAX_SAVE_DEBOUNCE_SECS {
        return Err(invalid(
            "recorder.save_debounce_secs",
            format!("save_debounce_secs must be at most {MAX_SAVE_DEBOUNCE_SECS}"),
        ));
    }

    if r.channel_capacity == 0 || r.channel_capacity > MAX_CHANNEL_CAPACITY {
        return Err(invalid(
            "recorder.channel_capacity",
            format!("channel_capacity must be between 1 and {MAX_CHANNEL_CAPACITY}"),
        ));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}
