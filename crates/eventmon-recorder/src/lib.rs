//! Eventmon Recorder - credential issuance history.
//!
//! This crate provides:
//! - A per-user, append-only issuance history with age-based expiry
//! - Cached, immutable snapshots of the whole history
//! - Crash-safe persistence (temp file + atomic rename)
//! - A single-owner recorder task fed through bounded channels
//!
//! # Concurrency Model
//!
//! The [`EventStore`] is owned by exactly one task. Issuance paths push
//! notifications into the recorder's inboxes and readers request
//! snapshots; neither ever touches the store directly, so no lock guards
//! it. Every mutation invalidates the snapshot cache before the next
//! message is handled, and saves are debounced to one per quiet period.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use eventmon_recorder::{EventRecorder, RecorderConfig, SshCertIssued};
//!
//! # async fn demo() -> Result<(), eventmon_recorder::RecorderError> {
//! let (handle, _task) = EventRecorder::open("/var/lib/eventmon/events.json", RecorderConfig::default())?;
//!
//! let valid_before = 1_700_005_400;
//! handle.record_ssh(SshCertIssued::new("alice", valid_before)).await?;
//!
//! if let Some(snapshot) = handle.snapshot(Duration::from_secs(1)).await {
//!     println!("{} users", snapshot.users.len());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod clock;
mod error;
mod history;
mod notification;
mod persist;
mod record;
mod recorder;
mod snapshot;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{RecorderError, RecorderResult};
pub use history::{ChainError, HistoryNode, NodeId, UserHistory, Walk};
pub use notification::{Notification, SshCertIssued, X509CertIssued};
pub use persist::{
    FileHistoryStore, HISTORY_FORMAT_VERSION, HistoryStore, MemoryHistoryStore, UserRecords,
    load_history, rebuild_store, save_history,
};
pub use record::{CredentialKind, IssuanceRecord, quantize_lifetime};
pub use recorder::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_EXPIRY_INTERVAL, DEFAULT_RETENTION, DEFAULT_SAVE_DEBOUNCE,
    EventRecorder, RecorderConfig, RecorderHandle, SnapshotReply, retention_cutoff,
};
pub use snapshot::{Snapshot, SnapshotCache};
pub use store::{EmptyHistoryPolicy, EventStore};
