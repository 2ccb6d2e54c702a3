//! Integration tests for the recorder task.
//!
//! Timer-driven behaviour (save debounce, hourly expiry) runs on paused
//! Tokio time; record timestamps come from a `ManualClock`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use eventmon_recorder::{
    CredentialKind, DEFAULT_RETENTION, EmptyHistoryPolicy, EventRecorder, HistoryStore,
    IssuanceRecord, ManualClock, MemoryHistoryStore, RecorderConfig, RecorderError, RecorderHandle, Snapshot,
    SshCertIssued, X509CertIssued,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const NOW: u64 = 1_700_000_000;
const WAIT: Duration = Duration::from_secs(1);

fn start(
    history: &Arc<MemoryHistoryStore>,
    clock: &ManualClock,
    config: RecorderConfig,
) -> (RecorderHandle, JoinHandle<()>) {
    let store = Arc::clone(history) as Arc<dyn HistoryStore>;
    EventRecorder::new(store, config, Arc::new(clock.clone()))
        .unwrap()
        .spawn()
}

async fn current(handle: &RecorderHandle) -> Arc<Snapshot> {
    handle.snapshot(WAIT).await.expect("snapshot reply")
}

#[tokio::test(start_paused = true)]
async fn test_single_ssh_issuance_is_recorded() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (handle, _task) = start(&history, &clock, RecorderConfig::default());

    handle
        .record_ssh(SshCertIssued::new("alice", NOW + 90 * 60))
        .await
        .unwrap();

    let snapshot = current(&handle).await;
    let records = snapshot.user("alice").unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].ssh);
    assert!(!records[0].x509);
    assert_eq!(records[0].lifetime_seconds, 5400);
    assert_eq!(records[0].create_time, NOW);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_is_empty_at_startup() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (handle, _task) = start(&history, &clock, RecorderConfig::default());

    let snapshot = current(&handle).await;
    assert!(snapshot.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_records_keep_arrival_order() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (handle, _task) = start(&history, &clock, RecorderConfig::default());

    for _ in 0..5 {
        handle
            .record_x509(X509CertIssued::new("bob", NOW + 86_400))
            .await
            .unwrap();
        // Let the recorder take the message before moving the clock.
        let _ = current(&handle).await;
        clock.advance(10);
    }

    let snapshot = current(&handle).await;
    let times: Vec<u64> = snapshot
        .user("bob")
        .unwrap()
        .iter()
        .map(|r| r.create_time)
        .collect();
    assert_eq!(times, vec![NOW + 40, NOW + 30, NOW + 20, NOW + 10, NOW]);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_snapshots_share_one_build() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (handle, _task) = start(&history, &clock, RecorderConfig::default());

    handle
        .record_ssh(SshCertIssued::new("alice", NOW + 60))
        .await
        .unwrap();
    let first = current(&handle).await;
    let second = current(&handle).await;
    assert!(Arc::ptr_eq(&first, &second));

    handle
        .record_ssh(SshCertIssued::new("alice", NOW + 60))
        .await
        .unwrap();
    let third = current(&handle).await;
    assert!(!Arc::ptr_eq(&second, &third));
    assert_eq!(third.total_records(), 2);
    assert_eq!(first.total_records(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_burst_is_saved_once() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (handle, _task) = start(&history, &clock, RecorderConfig::default());

    for i in 0..40 {
        handle
            .record_ssh(SshCertIssued::new(format!("user{}", i % 4), NOW + 3600))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(history.save_count(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(history.save_count(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(history.save_count(), 1);

    let saved = history.saved().unwrap();
    assert_eq!(saved.len(), 4);
    assert_eq!(saved.values().map(Vec::len).sum::<usize>(), 40);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_is_reset_by_each_mutation() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (handle, _task) = start(&history, &clock, RecorderConfig::default());

    handle
        .record_ssh(SshCertIssued::new("alice", NOW + 60))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    handle
        .record_x509(X509CertIssued::new("alice", NOW + 60))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(history.save_count(), 0, "deadline should have moved");

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(history.save_count(), 1);
    assert_eq!(history.saved().unwrap()["alice"].len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_producers() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (handle, _task) = start(&history, &clock, RecorderConfig::default());

    let mut producers = Vec::new();
    for worker in 0..4 {
        let handle = handle.clone();
        producers.push(tokio::spawn(async move {
            for _ in 0..25 {
                if worker % 2 == 0 {
                    handle
                        .record_ssh(SshCertIssued::new(format!("w{worker}"), NOW + 600))
                        .await
                        .unwrap();
                } else {
                    handle
                        .record_x509(X509CertIssued::new(format!("w{worker}"), NOW + 600))
                        .await
                        .unwrap();
                }
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    let snapshot = current(&handle).await;
    assert_eq!(snapshot.total_records(), 100);
    assert!(snapshot.user("w0").unwrap().iter().all(|r| r.ssh));
    assert!(snapshot.user("w1").unwrap().iter().all(|r| r.x509));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(history.save_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_notification_without_identity_is_ignored() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (handle, _task) = start(&history, &clock, RecorderConfig::default());

    handle
        .record_ssh(SshCertIssued {
            valid_principals: Vec::new(),
            valid_before: NOW + 60,
        })
        .await
        .unwrap();
    handle
        .record_x509(X509CertIssued::new("", NOW + 60))
        .await
        .unwrap();

    assert!(current(&handle).await.is_empty());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(history.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hourly_expiry_prunes_and_saves() {
    let mut seeded = BTreeMap::new();
    seeded.insert(
        "old".to_string(),
        vec![IssuanceRecord::new(
            NOW - DEFAULT_RETENTION.as_secs() + 100,
            3600,
            CredentialKind::Ssh,
        )],
    );
    seeded.insert(
        "fresh".to_string(),
        vec![IssuanceRecord::new(NOW, 3600, CredentialKind::X509)],
    );
    let history = Arc::new(MemoryHistoryStore::with_users(seeded));
    let clock = ManualClock::new(NOW);
    let (handle, _task) = start(&history, &clock, RecorderConfig::default());

    assert_eq!(current(&handle).await.total_records(), 2);

    clock.advance(200);
    tokio::time::sleep(Duration::from_secs(3601)).await;

    let snapshot = current(&handle).await;
    assert_eq!(snapshot.total_records(), 1);
    assert_eq!(snapshot.user("old"), Some(&[][..]));
    assert_eq!(snapshot.user("fresh").unwrap().len(), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(history.save_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_timer_rearms_every_hour() {
    let mut seeded = BTreeMap::new();
    seeded.insert(
        "ageing".to_string(),
        vec![
            IssuanceRecord::new(NOW - DEFAULT_RETENTION.as_secs() + 1000, 3600, CredentialKind::Ssh),
            IssuanceRecord::new(NOW, 3600, CredentialKind::Ssh),
        ],
    );
    let history = Arc::new(MemoryHistoryStore::with_users(seeded));
    let clock = ManualClock::new(NOW);
    let (handle, _task) = start(&history, &clock, RecorderConfig::default());

    // First pass: nothing is old enough yet.
    tokio::time::sleep(Duration::from_secs(3601)).await;
    assert_eq!(current(&handle).await.total_records(), 2);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(history.save_count(), 0);

    // The older record crosses the cutoff before the second pass.
    clock.advance(5000);
    tokio::time::sleep(Duration::from_secs(3600 - 6)).await;

    let snapshot = current(&handle).await;
    assert_eq!(snapshot.total_records(), 1);
    assert_eq!(snapshot.user("ageing").unwrap()[0].create_time, NOW);
    assert_eq!(history.save_count(), 0);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(history.save_count(), 1);
    assert_eq!(history.saved().unwrap()["ageing"].len(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(history.save_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_with_remove_policy_drops_user() {
    let mut seeded = BTreeMap::new();
    seeded.insert(
        "old".to_string(),
        vec![IssuanceRecord::new(
            NOW - DEFAULT_RETENTION.as_secs() + 100,
            3600,
            CredentialKind::Ssh,
        )],
    );
    let history = Arc::new(MemoryHistoryStore::with_users(seeded));
    let clock = ManualClock::new(NOW);
    let config = RecorderConfig::default().with_empty_history_policy(EmptyHistoryPolicy::Remove);
    let (handle, _task) = start(&history, &clock, config);

    clock.advance(200);
    tokio::time::sleep(Duration::from_secs(3601)).await;

    assert!(current(&handle).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_idle_recorder_never_saves() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (_handle, _task) = start(&history, &clock, RecorderConfig::default());

    tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
    assert_eq!(history.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_save_failure_does_not_stop_recorder() {
    let history = Arc::new(MemoryHistoryStore::new());
    history.set_fail_saves(true);
    let clock = ManualClock::new(NOW);
    let (handle, task) = start(&history, &clock, RecorderConfig::default());

    handle
        .record_ssh(SshCertIssued::new("alice", NOW + 60))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(history.failed_save_count(), 1);
    assert!(!task.is_finished());

    // No automatic retry: the next save follows the next mutation.
    history.set_fail_saves(false);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(history.save_count(), 0);

    handle
        .record_ssh(SshCertIssued::new("alice", NOW + 60))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(history.save_count(), 1);
    assert_eq!(history.saved().unwrap()["alice"].len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unready_snapshot_requester_is_skipped() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (handle, _task) = start(&history, &clock, RecorderConfig::default());

    // A reply slot that is already full.
    let (reply_tx, mut reply_rx) = mpsc::channel(1);
    reply_tx.try_send(Arc::new(Snapshot::default())).unwrap();
    handle.request_snapshot(reply_tx.clone()).await.unwrap();

    // A requester that has gone away.
    let (gone_tx, gone_rx) = mpsc::channel(1);
    drop(gone_rx);
    handle.request_snapshot(gone_tx).await.unwrap();

    // The recorder keeps serving.
    handle
        .record_ssh(SshCertIssued::new("alice", NOW + 60))
        .await
        .unwrap();
    assert_eq!(current(&handle).await.total_records(), 1);

    let placeholder = reply_rx.recv().await.unwrap();
    assert!(placeholder.is_empty());
    assert!(reply_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handles_flushes_and_stops() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (handle, task) = start(&history, &clock, RecorderConfig::default());

    handle
        .record_ssh(SshCertIssued::new("alice", NOW + 60))
        .await
        .unwrap();
    handle
        .record_x509(X509CertIssued::new("bob", NOW + 60))
        .await
        .unwrap();
    drop(handle);
    task.await.unwrap();

    assert_eq!(history.save_count(), 1);
    let saved = history.saved().unwrap();
    assert_eq!(saved["alice"].len(), 1);
    assert_eq!(saved["bob"].len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handle_reports_closed_recorder() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let (handle, task) = start(&history, &clock, RecorderConfig::default());
    task.abort();
    let _ = task.await;

    let err = handle
        .record_ssh(SshCertIssued::new("alice", NOW + 60))
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::Closed));
    assert!(handle.snapshot(WAIT).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_try_record_reports_full_inbox() {
    let history = Arc::new(MemoryHistoryStore::new());
    let clock = ManualClock::new(NOW);
    let config = RecorderConfig::default().with_channel_capacity(1);
    let (handle, _task) = start(&history, &clock, config);

    // The recorder task has not run yet on this single-threaded runtime,
    // so the one-slot inbox fills immediately.
    handle
        .try_record_ssh(SshCertIssued::new("alice", NOW + 60))
        .unwrap();
    let err = handle
        .try_record_ssh(SshCertIssued::new("alice", NOW + 60))
        .unwrap_err();
    assert!(matches!(err, RecorderError::InboxFull));

    assert_eq!(current(&handle).await.total_records(), 1);
}
