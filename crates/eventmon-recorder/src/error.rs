//! Recorder error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, saving, or talking to the recorder.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// No history has been persisted yet.
    #[error("history file not found: {}", path.display())]
    HistoryNotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The history file exists but could not be read or written.
    #[error("I/O error on history file {}: {source}", path.display())]
    Io {
        /// The history file involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The history file exists but its contents are not a valid history.
    #[error("failed to decode history file {}: {message}", path.display())]
    Decode {
        /// The history file involved.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },

    /// The history file was written by an incompatible format version.
    #[error("unsupported history format version {found} in {} (expected {expected})", path.display())]
    UnsupportedVersion {
        /// The history file involved.
        path: PathBuf,
        /// Version found in the file.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// Serialization error while encoding a history.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Storage backend error (non file-based stores).
    #[error("storage error: {0}")]
    Storage(String),

    /// The recorder task has stopped and no longer accepts messages.
    #[error("recorder is not running")]
    Closed,

    /// The recorder inbox is at capacity.
    #[error("recorder inbox is full")]
    InboxFull,
}

impl RecorderError {
    /// Whether this error means "no history stored yet" rather than a failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HistoryNotFound { .. })
    }
}

/// Result type for recorder operations.
pub type RecorderResult<T> = Result<T, RecorderError>;
