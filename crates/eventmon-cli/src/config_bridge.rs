//! Bridge from `eventmon_config::Config` to recorder and logging settings.

use eventmon_config::Config;
use eventmon_recorder::{EmptyHistoryPolicy, RecorderConfig};
use eventmon_telemetry::{LogConfig, LogFormat};

/// Convert config to the recorder's [`RecorderConfig`].
pub(crate) fn to_recorder_config(cfg: &Config) -> RecorderConfig {
    let policy = if cfg.recorder.remove_empty_histories {
        EmptyHistoryPolicy::Remove
    } else {
        EmptyHistoryPolicy::Retain
    };

    RecorderConfig::default()
        .with_retention(cfg.recorder.retention())
        .with_expiry_interval(cfg.recorder.expiry_interval())
        .with_save_debounce(cfg.recorder.save_debounce())
        .with_channel_capacity(cfg.recorder.channel_capacity)
        .with_empty_history_policy(policy)
}

/// Convert config to [`LogConfig`].
pub(crate) fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg
        .logging
        .format
        .parse()
        .unwrap_or(LogFormat::Compact);

    let log_config = LogConfig::new(&cfg.logging.level)
        .with_format(format)
        .with_directives(&cfg.logging.directives);

    match &cfg.logging.directory {
        Some(dir) => log_config.with_file_logging(dir),
        None => log_config,
    }
}
