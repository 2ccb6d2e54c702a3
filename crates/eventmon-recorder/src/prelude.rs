//! Prelude module - commonly used types for convenient import.
//!
//! Use `use eventmon_recorder::prelude::*;` to import all essential types.

// Errors
pub use crate::{RecorderError, RecorderResult};

// Records and notifications
pub use crate::{CredentialKind, IssuanceRecord, Notification, SshCertIssued, X509CertIssued};

// Recorder task
pub use crate::{EventRecorder, RecorderConfig, RecorderHandle, Snapshot};

// Storage
pub use crate::{EmptyHistoryPolicy, EventStore, FileHistoryStore, HistoryStore};

// Time
pub use crate::{Clock, SystemClock};
