//! The event recorder task.
//!
//! One task owns the [`EventStore`] and its [`SnapshotCache`]. Everything
//! else talks to it through a [`RecorderHandle`], so the store needs no lock.
//!
//! # Architecture
//!
//! ```text
//! SSH notifications  ─┐
//! X.509 notifications ├─→ select! loop ─→ store mutation ─→ cache invalidated
//! snapshot requests  ─┤                                  └→ save deadline re-armed (5s)
//! hourly expiry tick ─┤
//! save deadline      ─┘─→ snapshot ─→ HistoryStore::save
//! ```
//!
//! Exactly one message or timer is handled per loop iteration. The select
//! is `biased` so that notifications already queued when a snapshot request
//! arrives are applied before the request is answered.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{RecorderError, RecorderResult};
use crate::notification::{Notification, SshCertIssued, X509CertIssued};
use crate::persist::{FileHistoryStore, HistoryStore};
use crate::record::{IssuanceRecord, quantize_lifetime};
use crate::snapshot::{Snapshot, SnapshotCache};
use crate::store::{EmptyHistoryPolicy, EventStore};

/// How long issuance records are kept (31 days).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(31 * 24 * 60 * 60);

/// How often expired records are pruned.
pub const DEFAULT_EXPIRY_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Quiet period after the last mutation before the history is saved.
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_secs(5);

/// Capacity of each recorder inbox.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Where the recorder sends a requested snapshot.
///
/// Replies are delivered with `try_send`: if the channel is full or closed
/// the reply is dropped and the requester should ask again later.
pub type SnapshotReply = mpsc::Sender<Arc<Snapshot>>;

/// Recorder tuning.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Records older than this are expired.
    pub retention: Duration,
    /// Interval between expiry passes.
    pub expiry_interval: Duration,
    /// Debounce window for saves.
    pub save_debounce: Duration,
    /// Capacity of each inbox channel.
    pub channel_capacity: usize,
    /// What happens to users whose history expires completely.
    pub empty_history_policy: EmptyHistoryPolicy,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            expiry_interval: DEFAULT_EXPIRY_INTERVAL,
            save_debounce: DEFAULT_SAVE_DEBOUNCE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            empty_history_policy: EmptyHistoryPolicy::default(),
        }
    }
}

impl RecorderConfig {
    /// Set the retention window.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the expiry interval.
    #[must_use]
    pub fn with_expiry_interval(mut self, interval: Duration) -> Self {
        self.expiry_interval = interval;
        self
    }

    /// Set the save debounce window.
    #[must_use]
    pub fn with_save_debounce(mut self, debounce: Duration) -> Self {
        self.save_debounce = debounce;
        self
    }

    /// Set the inbox capacity (minimum 1).
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the empty-history policy.
    #[must_use]
    pub fn with_empty_history_policy(mut self, policy: EmptyHistoryPolicy) -> Self {
        self.empty_history_policy = policy;
        self
    }
}

/// Cheap, cloneable handle for feeding and querying a running recorder.
#[derive(Debug, Clone)]
pub struct RecorderHandle {
    ssh_tx: mpsc::Sender<SshCertIssued>,
    x509_tx: mpsc::Sender<X509CertIssued>,
    snapshot_tx: mpsc::Sender<SnapshotReply>,
}

impl RecorderHandle {
    /// Queue an SSH issuance, waiting for inbox space.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::Closed`] if the recorder has stopped.
    pub async fn record_ssh(&self, cert: SshCertIssued) -> RecorderResult<()> {
        self.ssh_tx
            .send(cert)
            .await
            .map_err(|_| RecorderError::Closed)
    }

    /// Queue an X.509 issuance, waiting for inbox space.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::Closed`] if the recorder has stopped.
    pub async fn record_x509(&self, cert: X509CertIssued) -> RecorderResult<()> {
        self.x509_tx
            .send(cert)
            .await
            .map_err(|_| RecorderError::Closed)
    }

    /// Queue either kind of issuance.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::Closed`] if the recorder has stopped.
    pub async fn record(&self, notification: Notification) -> RecorderResult<()> {
        match notification {
            Notification::Ssh(cert) => self.record_ssh(cert).await,
            Notification::X509(cert) => self.record_x509(cert).await,
        }
    }

    /// Queue an SSH issuance without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::InboxFull`] or [`RecorderError::Closed`].
    pub fn try_record_ssh(&self, cert: SshCertIssued) -> RecorderResult<()> {
        self.ssh_tx.try_send(cert).map_err(inbox_error)
    }

    /// Queue an X.509 issuance without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::InboxFull`] or [`RecorderError::Closed`].
    pub fn try_record_x509(&self, cert: X509CertIssued) -> RecorderResult<()> {
        self.x509_tx.try_send(cert).map_err(inbox_error)
    }

    /// Ask for a snapshot to be delivered on `reply`.
    ///
    /// Delivery is best effort: the recorder never waits on `reply`.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::Closed`] if the recorder has stopped.
    pub async fn request_snapshot(&self, reply: SnapshotReply) -> RecorderResult<()> {
        self.snapshot_tx
            .send(reply)
            .await
            .map_err(|_| RecorderError::Closed)
    }

    /// Request a snapshot and wait up to `timeout` for it.
    ///
    /// `None` means "try again later", not a failure of the recorder.
    pub async fn snapshot(&self, timeout: Duration) -> Option<Arc<Snapshot>> {
        let (tx, mut rx) = mpsc::channel(1);
        self.request_snapshot(tx).await.ok()?;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// The raw SSH notification sender.
    #[must_use]
    pub fn ssh_sender(&self) -> mpsc::Sender<SshCertIssued> {
        self.ssh_tx.clone()
    }

    /// The raw X.509 notification sender.
    #[must_use]
    pub fn x509_sender(&self) -> mpsc::Sender<X509CertIssued> {
        self.x509_tx.clone()
    }

    /// The raw snapshot request sender.
    #[must_use]
    pub fn snapshot_sender(&self) -> mpsc::Sender<SnapshotReply> {
        self.snapshot_tx.clone()
    }
}

fn inbox_error<T>(err: TrySendError<T>) -> RecorderError {
    match err {
        TrySendError::Full(_) => RecorderError::InboxFull,
        TrySendError::Closed(_) => RecorderError::Closed,
    }
}

/// Receiving ends of the recorder's inboxes.
struct Inbox {
    ssh: mpsc::Receiver<SshCertIssued>,
    x509: mpsc::Receiver<X509CertIssued>,
    snapshots: mpsc::Receiver<SnapshotReply>,
}

/// Owner of the issuance history.
///
/// Build one with [`EventRecorder::new`] (or [`EventRecorder::open`]) and
/// move it into its task with [`EventRecorder::spawn`]. The synchronous
/// methods are the same operations the task performs per message.
#[derive(Debug)]
pub struct EventRecorder {
    store: EventStore,
    cache: SnapshotCache,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    config: RecorderConfig,
}

impl EventRecorder {
    /// Load the stored history and build a recorder around it.
    ///
    /// A missing history starts an empty store. Records older than the
    /// retention window are dropped while loading.
    ///
    /// # Errors
    ///
    /// Returns the load error if a stored history exists but cannot be read
    /// or decoded. Starting with an empty audit trail in that case would
    /// silently discard history.
    pub fn new(
        history: Arc<dyn HistoryStore>,
        config: RecorderConfig,
        clock: Arc<dyn Clock>,
    ) -> RecorderResult<Self> {
        let cutoff = retention_cutoff(clock.now_secs(), config.retention);
        let store = match history.load(cutoff) {
            Ok(store) => {
                info!(
                    users = store.len(),
                    records = store.total_records(),
                    "Loaded issuance history"
                );
                store
            },
            Err(e) if e.is_not_found() => {
                info!("No issuance history found, starting empty");
                EventStore::new()
            },
            Err(e) => return Err(e),
        };
        Ok(Self {
            store,
            cache: SnapshotCache::new(),
            history,
            clock,
            config,
        })
    }

    /// Start a recorder backed by the history file at `path`, using the
    /// system clock.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// See [`EventRecorder::new`].
    pub fn open(
        path: impl Into<PathBuf>,
        config: RecorderConfig,
    ) -> RecorderResult<(RecorderHandle, JoinHandle<()>)> {
        let history = Arc::new(FileHistoryStore::new(path));
        Ok(Self::new(history, config, Arc::new(SystemClock))?.spawn())
    }

    /// Move the recorder into its own task.
    ///
    /// The task runs until every [`RecorderHandle`] (and raw sender) has been
    /// dropped, then flushes a pending save and exits.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(self) -> (RecorderHandle, JoinHandle<()>) {
        let capacity = self.config.channel_capacity.max(1);
        let (ssh_tx, ssh) = mpsc::channel(capacity);
        let (x509_tx, x509) = mpsc::channel(capacity);
        let (snapshot_tx, snapshots) = mpsc::channel(capacity);

        let handle = RecorderHandle {
            ssh_tx,
            x509_tx,
            snapshot_tx,
        };
        let inbox = Inbox {
            ssh,
            x509,
            snapshots,
        };
        let task = tokio::spawn(self.run(inbox));
        (handle, task)
    }

    /// Record one notification. Returns whether the store changed.
    ///
    /// Notifications without a usable identity are logged and dropped.
    pub fn record(&mut self, notification: &Notification) -> bool {
        let kind = notification.kind();
        let Some(username) = notification.identity() else {
            warn!(%kind, "Dropping issuance notification without an identity");
            return false;
        };
        let now = self.clock.now_secs();
        let lifetime_seconds = quantize_lifetime(notification.remaining_lifetime(now));
        self.store
            .append_record(username, IssuanceRecord::new(now, lifetime_seconds, kind));
        self.cache.invalidate();
        debug!(user = username, %kind, lifetime_seconds, "Recorded credential issuance");
        true
    }

    /// Expire records older than the retention window. Returns whether the
    /// store changed.
    pub fn expire(&mut self) -> bool {
        let cutoff = retention_cutoff(self.clock.now_secs(), self.config.retention);
        let records_before = self.store.total_records();
        let changed = self
            .store
            .expire_older_than_with(cutoff, self.config.empty_history_policy);
        if changed {
            self.cache.invalidate();
            info!(
                cutoff,
                expired = records_before.saturating_sub(self.store.total_records()),
                "Expired old issuance records"
            );
        }
        changed
    }

    /// The current snapshot, rebuilt only if the store changed since the
    /// last call.
    pub fn snapshot(&mut self) -> Arc<Snapshot> {
        self.cache.get(&self.store, self.clock.now_secs())
    }

    /// Write the current snapshot to the history store.
    ///
    /// # Errors
    ///
    /// Returns the history store's error.
    pub fn save(&mut self) -> RecorderResult<()> {
        let snapshot = self.snapshot();
        self.history.save(&snapshot.users, self.clock.now_secs())
    }

    /// The live store.
    #[must_use]
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// How many times the snapshot has been rebuilt.
    #[must_use]
    pub fn snapshot_rebuilds(&self) -> u64 {
        self.cache.rebuild_count()
    }

    fn reply(&mut self, reply: &SnapshotReply) {
        let snapshot = self.snapshot();
        match reply.try_send(snapshot) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                debug!("Snapshot requester not ready, dropping reply");
            },
            Err(TrySendError::Closed(_)) => {
                debug!("Snapshot requester went away, dropping reply");
            },
        }
    }

    fn save_logged(&mut self) {
        match self.save() {
            Ok(()) => debug!(
                users = self.store.len(),
                records = self.store.total_records(),
                "Persisted issuance history"
            ),
            Err(e) => warn!(error = %e, "Failed to persist issuance history"),
        }
    }

    async fn run(mut self, mut inbox: Inbox) {
        // Have a snapshot ready for the first query.
        let _ = self.snapshot();

        let expiry_interval = self.config.expiry_interval;
        let debounce = self.config.save_debounce;
        let mut next_expiry = deadline_after(expiry_interval);
        let mut save_at: Option<Instant> = None;

        info!(
            users = self.store.len(),
            records = self.store.total_records(),
            "Event recorder started"
        );

        let mut ssh_open = true;
        let mut x509_open = true;
        let mut snapshots_open = true;

        while ssh_open || x509_open || snapshots_open {
            tokio::select! {
                biased;

                () = tokio::time::sleep_until(next_expiry) => {
                    next_expiry = deadline_after(expiry_interval);
                    if self.expire() {
                        save_at = Some(deadline_after(debounce));
                    }
                }

                cert = inbox.ssh.recv(), if ssh_open => match cert {
                    Some(cert) => {
                        if self.record(&Notification::Ssh(cert)) {
                            save_at = Some(deadline_after(debounce));
                        }
                    },
                    None => ssh_open = false,
                },

                cert = inbox.x509.recv(), if x509_open => match cert {
                    Some(cert) => {
                        if self.record(&Notification::X509(cert)) {
                            save_at = Some(deadline_after(debounce));
                        }
                    },
                    None => x509_open = false,
                },

                () = sleep_until_armed(save_at) => {
                    save_at = None;
                    self.save_logged();
                }

                reply = inbox.snapshots.recv(), if snapshots_open => match reply {
                    Some(reply) => self.reply(&reply),
                    None => snapshots_open = false,
                },
            }
        }

        self.shutdown(save_at.is_some());
    }

    /// Every inbox is closed and drained; flush a pending save.
    fn shutdown(&mut self, save_pending: bool) {
        if save_pending {
            self.save_logged();
        }
        info!("Event recorder stopped");
    }
}

/// Oldest creation time still inside the retention window.
#[must_use]
pub fn retention_cutoff(now: u64, retention: Duration) -> u64 {
    now.saturating_sub(retention.as_secs())
}

#[allow(clippy::arithmetic_side_effects)]
// Instant + Duration cannot overflow in practice
fn deadline_after(delay: Duration) -> Instant {
    Instant::now() + delay
}

async fn sleep_until_armed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
