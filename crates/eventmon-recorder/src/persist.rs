//! Durable storage for the event store.
//!
//! The history file is JSON:
//!
//! ```text
//! { "version": 1, "saved_at": 1700000000,
//!   "users": { "alice": [ { "create_time": .., "lifetime_seconds": .., "ssh": true, "x509": false }, .. ] } }
//! ```
//!
//! Each user's records are stored newest first, the same order a
//! [`Snapshot`](crate::Snapshot) uses.
//!
//! # Crash Safety
//!
//! Saves write a temp file in the destination directory, fsync it, then
//! rename it over the destination. Readers (and a restarted recorder) only
//! ever see a complete file.

use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RecorderError, RecorderResult};
use crate::history::UserHistory;
use crate::record::IssuanceRecord;
use crate::store::EventStore;

/// Current history file format version.
pub const HISTORY_FORMAT_VERSION: u32 = 1;

/// Owner read/write, group and other read.
#[cfg(unix)]
const HISTORY_FILE_MODE: u32 = 0o644;

/// Per-user records, newest first.
pub type UserRecords = BTreeMap<String, Vec<IssuanceRecord>>;

#[derive(Serialize)]
struct HistoryFileRef<'a> {
    version: u32,
    saved_at: u64,
    users: &'a UserRecords,
}

#[derive(Deserialize)]
struct HistoryHeader {
    version: u32,
}

#[derive(Deserialize)]
struct HistoryFile {
    #[serde(default)]
    saved_at: u64,
    users: UserRecords,
}

/// Backend the recorder loads from at startup and saves to after mutations.
pub trait HistoryStore: Send + Sync + std::fmt::Debug {
    /// Load the stored history, dropping records created before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::HistoryNotFound`] when nothing has been stored
    /// yet, and other variants when stored data exists but is unusable.
    fn load(&self, cutoff: u64) -> RecorderResult<EventStore>;

    /// Replace the stored history.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be encoded or written.
    fn save(&self, users: &UserRecords, saved_at: u64) -> RecorderResult<()>;
}

/// Rebuild an event store from newest-first record lists.
///
/// Records are relinked oldest first. Anything created before `cutoff` is
/// skipped while linking. Records are stably sorted by creation time so the
/// expiry boundary stays monotonic even for an out-of-order file.
#[must_use]
pub fn rebuild_store(users: UserRecords, cutoff: u64) -> EventStore {
    let mut store = EventStore::new();
    for (username, mut records) in users {
        records.reverse();
        records.sort_by_key(|r| r.create_time);
        let history = UserHistory::from_records(
            records.into_iter().filter(|r| r.create_time >= cutoff),
        );
        store.insert_history(username, history);
    }
    store
}

/// Load a history file written by [`save_history`].
///
/// # Errors
///
/// - [`RecorderError::HistoryNotFound`] if the file does not exist.
/// - [`RecorderError::Io`] if it exists but cannot be read.
/// - [`RecorderError::Decode`] / [`RecorderError::UnsupportedVersion`] if
///   its contents are not a history this build understands.
pub fn load_history(path: &Path, cutoff: u64) -> RecorderResult<EventStore> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RecorderError::HistoryNotFound {
                path: path.to_path_buf(),
            });
        },
        Err(e) => {
            return Err(RecorderError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        },
    };

    let decode_err = |e: serde_json::Error| RecorderError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let header: HistoryHeader = serde_json::from_slice(&bytes).map_err(decode_err)?;
    if header.version != HISTORY_FORMAT_VERSION {
        return Err(RecorderError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: header.version,
            expected: HISTORY_FORMAT_VERSION,
        });
    }
    let file: HistoryFile = serde_json::from_slice(&bytes).map_err(decode_err)?;

    let store = rebuild_store(file.users, cutoff);
    debug!(
        path = %path.display(),
        saved_at = file.saved_at,
        users = store.len(),
        records = store.total_records(),
        "Loaded issuance history"
    );
    Ok(store)
}

/// Atomically replace the history file at `path`.
///
/// Creates the parent directory if needed.
///
/// # Errors
///
/// Returns an error if the file cannot be encoded, written, or renamed
/// into place. The previous file is left untouched in that case.
pub fn save_history(path: &Path, users: &UserRecords, saved_at: u64) -> RecorderResult<()> {
    let io_err = |source: std::io::Error| RecorderError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(
            &mut writer,
            &HistoryFileRef {
                version: HISTORY_FORMAT_VERSION,
                saved_at,
                users,
            },
        )
        .map_err(|e| RecorderError::Serialization(e.to_string()))?;
        writer.flush().map_err(io_err)?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(HISTORY_FILE_MODE))
            .map_err(io_err)?;
    }

    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    debug!(path = %path.display(), users = users.len(), "Saved issuance history");
    Ok(())
}

/// History stored in a single file on disk.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    /// Use the history file at `path`. Nothing is touched until load/save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The history file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self, cutoff: u64) -> RecorderResult<EventStore> {
        load_history(&self.path, cutoff)
    }

    fn save(&self, users: &UserRecords, saved_at: u64) -> RecorderResult<()> {
        save_history(&self.path, users, saved_at)
    }
}

/// In-process history store, for tests and embedding without a file.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    saved: Mutex<Option<UserRecords>>,
    saves: AtomicUsize,
    failed_saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryHistoryStore {
    /// An empty store; the first load reports "not found".
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `users` (newest first per user).
    #[must_use]
    pub fn with_users(users: UserRecords) -> Self {
        Self {
            saved: Mutex::new(Some(users)),
            ..Self::default()
        }
    }

    /// The most recently saved history.
    #[must_use]
    pub fn saved(&self) -> Option<UserRecords> {
        self.saved.lock().ok().and_then(|guard| guard.clone())
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of saves rejected through [`set_fail_saves`](Self::set_fail_saves).
    #[must_use]
    pub fn failed_save_count(&self) -> usize {
        self.failed_saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self, cutoff: u64) -> RecorderResult<EventStore> {
        let guard = self
            .saved
            .lock()
            .map_err(|e| RecorderError::Storage(e.to_string()))?;
        match guard.as_ref() {
            Some(users) => Ok(rebuild_store(users.clone(), cutoff)),
            None => Err(RecorderError::HistoryNotFound {
                path: PathBuf::from("<memory>"),
            }),
        }
    }

    fn save(&self, users: &UserRecords, _saved_at: u64) -> RecorderResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            self.failed_saves.fetch_add(1, Ordering::SeqCst);
            return Err(RecorderError::Storage("save rejected".to_string()));
        }
        let mut guard = self
            .saved
            .lock()
            .map_err(|e| RecorderError::Storage(e.to_string()))?;
        *guard = Some(users.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
