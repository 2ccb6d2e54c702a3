//! Environment variable overrides.
//!
//! Only a small set of `EVENTMON_*` variables is honoured. Overrides are
//! applied after the config file is parsed and before validation, so a bad
//! value is reported the same way as a bad file entry.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Overrides `recorder.history_file`.
pub const ENV_HISTORY_FILE: &str = "EVENTMON_HISTORY_FILE";
/// Overrides `recorder.retention_days`.
pub const ENV_RETENTION_DAYS: &str = "EVENTMON_RETENTION_DAYS";
/// Overrides `logging.level`.
pub const ENV_LOG_LEVEL: &str = "EVENTMON_LOG_LEVEL";

/// Apply `EVENTMON_*` overrides from `env_vars` to `config`.
///
/// Empty values are ignored. Returns the number of overrides applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a numeric override does not parse.
pub fn apply_env_overrides(
    config: &mut Config,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<usize> {
    let mut applied: usize = 0;

    if let Some(path) = non_empty(env_vars, ENV_HISTORY_FILE) {
        config.recorder.history_file = Some(PathBuf::from(path));
        applied = applied.saturating_add(1);
    }

    if let Some(days) = non_empty(env_vars, ENV_RETENTION_DAYS) {
        config.recorder.retention_days =
            days.parse().map_err(|e| ConfigError::EnvError {
                var_name: ENV_RETENTION_DAYS.to_owned(),
                message: format!("expected a whole number of days, got '{days}': {e}"),
            })?;
        applied = applied.saturating_add(1);
    }

    if let Some(level) = non_empty(env_vars, ENV_LOG_LEVEL) {
        config.logging.level = level.to_ascii_lowercase();
        applied = applied.saturating_add(1);
    }

    if applied > 0 {
        debug!(count = applied, "applied environment overrides");
    }
    Ok(applied)
}

fn non_empty<'a>(env_vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    env_vars
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_no_overrides() {
        let mut config = Config::default();
        let applied = apply_env_overrides(&mut config, &make_env(&[])).unwrap();
        assert_eq!(applied, 0);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_history_file_override() {
        let mut config = Config::default();
        let env = make_env(&[(ENV_HISTORY_FILE, "/srv/eventmon/events.json")]);
        assert_eq!(apply_env_overrides(&mut config, &env).unwrap(), 1);
        assert_eq!(
            config.recorder.history_file,
            Some(PathBuf::from("/srv/eventmon/events.json"))
        );
    }

    #[test]
    fn test_log_level_is_lowercased() {
        let mut config = Config::default();
        let env = make_env(&[(ENV_LOG_LEVEL, "DEBUG")]);
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_blank_values_ignored() {
        let mut config = Config::default();
        let env = make_env(&[(ENV_HISTORY_FILE, "  "), (ENV_LOG_LEVEL, "")]);
        assert_eq!(apply_env_overrides(&mut config, &env).unwrap(), 0);
        assert!(config.recorder.history_file.is_none());
    }

    #[test]
    fn test_retention_override() {
        let mut config = Config::default();
        let env = make_env(&[(ENV_RETENTION_DAYS, "90")]);
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.recorder.retention_days, 90);
    }

    #[test]
    fn test_bad_retention_override() {
        let mut config = Config::default();
        let env = make_env(&[(ENV_RETENTION_DAYS, "a month")]);
        let err = apply_env_overrides(&mut config, &env).unwrap_err();
        assert!(matches!(err, ConfigError::EnvError { ref var_name, .. } if var_name == ENV_RETENTION_DAYS));
    }
}
