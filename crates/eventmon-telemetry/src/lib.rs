//! Eventmon Telemetry - logging setup for eventmon.
//!
//! This crate provides:
//! - A serializable [`LogConfig`] with builder methods
//! - Pretty, compact, JSON and full line formats
//! - Stdout, stderr or daily-rotated file output
//!
//! Everything else logs through the `tracing` macros; this crate only
//! installs the subscriber.
//!
//! # Example
//!
//! ```rust,no_run
//! use eventmon_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), eventmon_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("eventmon_recorder=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!(users = 3, "Recorder ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
