//! CLI theme and styling.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use colored::Colorize;

/// CLI theme configuration.
pub(crate) struct Theme;

impl Theme {
    /// Format a header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format a warning message.
    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// Format an info message.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    /// Format a separator line.
    pub(crate) fn separator() -> String {
        "━".repeat(64).dimmed().to_string()
    }

    /// Format a column heading.
    pub(crate) fn column(text: &str) -> String {
        text.dimmed().to_string()
    }

    /// Format a username.
    pub(crate) fn user(name: &str) -> String {
        name.bold().to_string()
    }

    /// Format a credential kind, left-aligned to `width` columns.
    pub(crate) fn kind(kind: &str, width: usize) -> String {
        let padded = format!("{kind:<width$}");
        match kind {
            "ssh" => padded.green().to_string(),
            "x509" => padded.magenta().to_string(),
            _ => padded.dimmed().to_string(),
        }
    }

    /// Format a Unix timestamp.
    pub(crate) fn timestamp(secs: u64) -> String {
        format_timestamp(secs).dimmed().to_string()
    }
}

/// `YYYY-MM-DD HH:MM` in UTC, or the raw number if it is out of range.
pub(crate) fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map_or_else(|| secs.to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string())
}

/// Compact lifetime: `5400` becomes `1h30m`, `86400` becomes `1d`.
pub(crate) fn format_lifetime(secs: u32) -> String {
    const MINUTE: u32 = 60;
    const HOUR: u32 = 60 * MINUTE;
    const DAY: u32 = 24 * HOUR;

    if secs == 0 {
        return "0s".to_owned();
    }

    let mut out = String::new();
    let mut rest = secs;
    for (unit, label) in [(DAY, "d"), (HOUR, "h"), (MINUTE, "m"), (1, "s")] {
        let count = rest.checked_div(unit).unwrap_or(0);
        if count > 0 {
            let _ = write!(out, "{count}{label}");
            rest = rest.checked_rem(unit).unwrap_or(0);
        }
    }
    out
}
