//! Chaos Testing for the offline sync core
//!
//! Failure scenarios driven by a **FailingLocalStore** wrapper that injects
//! storage errors at precise call counts, plus a flaky remote.
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde_json::json;

use opendoor_sync::{
    ConnectivityMonitor, DrainOutcome, InMemoryLocalStore, InMemoryRemote, LocalStore, Notice,
    OfflineSyncConfig, OperationKind, PendingOperation, Record, RecordIndex, RecordKind,
    RecordingNotifier, SaveOutcome, StaticAuth, StorageError, SyncContext, SyncEngine, SyncError, Table,
};

// =============================================================================
// Failing Store Wrapper - Precise Error Injection
// =============================================================================

/// Which store calls the wrapper intercepts.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Target {
    Everything,
    Queue,
    Clear,
}

/// Wraps a store and fails selected calls.
pub struct FailingLocalStore<S: LocalStore> {
    inner: S,
    call_count: AtomicU64,
    /// Fail on these call numbers (1-indexed, counted over targeted calls)
    fail_on_calls: Vec<u64>,
    error_msg: String,
    /// Fail every targeted call from `fail_on_calls[0]` on
    fail_permanently: AtomicBool,
    target: Target,
}

impl<S: LocalStore> FailingLocalStore<S> {
    fn new(inner: S, target: Target, fail_on_calls: Vec<u64>, error_msg: &str) -> Self {
        Self {
            inner,
            call_count: AtomicU64::new(0),
            fail_on_calls,
            error_msg: error_msg.to_string(),
            fail_permanently: AtomicBool::new(false),
            target,
        }
    }

    /// Fail every targeted call after the first `n`
    fn fail_after(inner: S, target: Target, n: u64, error_msg: &str) -> Self {
        let store = Self::new(inner, target, vec![n + 1], error_msg);
        store.fail_permanently.store(true, Ordering::SeqCst);
        store
    }

    fn should_fail(&self, call: Target) -> bool {
        if self.target != Target::Everything && self.target != call {
            return false;
        }
        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_permanently.load(Ordering::SeqCst) && !self.fail_on_calls.is_empty() {
            count >= self.fail_on_calls[0]
        } else {
            self.fail_on_calls.contains(&count)
        }
    }

    fn maybe_fail(&self, call: Target) -> Result<(), StorageError> {
        if self.should_fail(call) {
            Err(StorageError::Backend(self.error_msg.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: LocalStore> LocalStore for FailingLocalStore<S> {
    async fn put_record(&self, kind: RecordKind, record: &Record) -> Result<String, StorageError> {
        self.maybe_fail(Target::Everything)?;
        self.inner.put_record(kind, record).await
    }

    async fn get_record(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StorageError> {
        self.maybe_fail(Target::Everything)?;
        self.inner.get_record(kind, id).await
    }

    async fn all_records(&self, kind: RecordKind) -> Result<Vec<Record>, StorageError> {
        self.maybe_fail(Target::Everything)?;
        self.inner.all_records(kind).await
    }

    async fn records_by_index(&self, kind: RecordKind, index: RecordIndex, value: &str) -> Result<Vec<Record>, StorageError> {
        self.maybe_fail(Target::Everything)?;
        self.inner.records_by_index(kind, index, value).await
    }

    async fn delete_record(&self, kind: RecordKind, id: &str) -> Result<(), StorageError> {
        self.maybe_fail(Target::Everything)?;
        self.inner.delete_record(kind, id).await
    }

    async fn enqueue(&self, kind: OperationKind, data: &Record) -> Result<PendingOperation, StorageError> {
        self.maybe_fail(Target::Queue)?;
        self.inner.enqueue(kind, data).await
    }

    async fn pending_operations(&self) -> Result<Vec<PendingOperation>, StorageError> {
        self.maybe_fail(Target::Queue)?;
        self.inner.pending_operations().await
    }

    async fn operations_by_type(&self, kind: OperationKind) -> Result<Vec<PendingOperation>, StorageError> {
        self.maybe_fail(Target::Queue)?;
        self.inner.operations_by_type(kind).await
    }

    async fn operations_since(&self, timestamp: i64) -> Result<Vec<PendingOperation>, StorageError> {
        self.maybe_fail(Target::Queue)?;
        self.inner.operations_since(timestamp).await
    }

    async fn update_operation(&self, op: &PendingOperation) -> Result<(), StorageError> {
        self.maybe_fail(Target::Queue)?;
        self.inner.update_operation(op).await
    }

    async fn delete_operation(&self, id: i64) -> Result<(), StorageError> {
        self.maybe_fail(Target::Queue)?;
        self.inner.delete_operation(id).await
    }

    async fn count_operations(&self) -> Result<usize, StorageError> {
        // Status bookkeeping is never the injection point
        self.inner.count_operations().await
    }

    async fn clear(&self, table: Table) -> Result<(), StorageError> {
        self.maybe_fail(Target::Clear)?;
        self.inner.clear(table).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Rig {
    engine: SyncEngine,
    remote: Arc<InMemoryRemote>,
    monitor: Arc<ConnectivityMonitor>,
    notices: Arc<RecordingNotifier>,
}

fn rig(store: Arc<dyn LocalStore>, online: bool) -> Rig {
    let remote = Arc::new(InMemoryRemote::new());
    let monitor = Arc::new(ConnectivityMonitor::new(online));
    let notices = Arc::new(RecordingNotifier::new());
    let engine = SyncEngine::new(
        OfflineSyncConfig::default(),
        store,
        remote.clone(),
        Arc::new(StaticAuth::signed_in("uid-chaos")),
        monitor.clone(),
    )
    .with_notifier(notices.clone());
    Rig { engine, remote, monitor, notices }
}

fn pledge(beds: u32) -> Record {
    Record::from_json(json!({"beds": beds, "city": "Reno"})).unwrap()
}

// =============================================================================
// Local store failures
// =============================================================================

#[tokio::test]
async fn chaos_enqueue_failure_rejects_offline_save() {
    let store = FailingLocalStore::new(InMemoryLocalStore::new(), Target::Queue, vec![1], "disk full");
    let rig = rig(Arc::new(store), false);

    let outcome = rig.engine.save(OperationKind::Pledge, pledge(1)).await.unwrap();
    match outcome {
        SaveOutcome::Rejected { reason } => assert!(reason.contains("disk full")),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(rig.engine.status().pending_count, 0);

    // Next save goes through
    let outcome = rig.engine.save(OperationKind::Pledge, pledge(2)).await.unwrap();
    assert!(outcome.is_deferred());
    assert_eq!(rig.engine.status().pending_count, 1);
}

#[tokio::test]
async fn chaos_record_write_failure_rejects_offline_save() {
    let store = FailingLocalStore::new(InMemoryLocalStore::new(), Target::Everything, vec![1], "quota exceeded");
    let rig = rig(Arc::new(store), false);

    let outcome = rig.engine.save(OperationKind::Request, pledge(1)).await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Rejected { .. }));
}

#[tokio::test]
async fn chaos_online_mirror_failure_is_returned() {
    let store = FailingLocalStore::fail_after(InMemoryLocalStore::new(), Target::Everything, 0, "disk full");
    let rig = rig(Arc::new(store), true);

    let err = rig.engine.save(OperationKind::Request, pledge(1)).await.unwrap_err();
    assert!(matches!(err, SyncError::Storage(StorageError::Backend(ref m)) if m == "disk full"));
    // The remote write itself went through and nothing was queued
    assert_eq!(rig.remote.documents("requests").len(), 1);
    assert_eq!(rig.engine.status().pending_count, 0);
}

#[tokio::test]
async fn chaos_unreadable_queue_aborts_drain() {
    // Enqueue succeeds, every later queue read fails
    let store = FailingLocalStore::fail_after(InMemoryLocalStore::new(), Target::Queue, 1, "database is locked");
    let rig = rig(Arc::new(store), false);
    rig.engine.save(OperationKind::Pledge, pledge(1)).await.unwrap();

    rig.monitor.set_online(true);
    let outcome = rig.engine.drain().await;
    assert!(matches!(outcome, DrainOutcome::Aborted(ref reason) if reason.contains("database is locked")));
    assert!(rig.notices.contains(&Notice::SyncFailed));
    assert!(!rig.engine.status().is_syncing);
    assert_eq!(rig.remote.write_count(), 0);

    // The guard released the drain flag
    assert!(!rig.engine.is_syncing());
}

#[tokio::test]
async fn chaos_dequeue_failure_keeps_operation_for_next_pass() {
    // Call 1: enqueue, 2: pending_operations, 3: delete_operation (fails)
    let store = FailingLocalStore::new(InMemoryLocalStore::new(), Target::Queue, vec![3], "I/O error");
    let rig = rig(Arc::new(store), false);
    rig.engine.save(OperationKind::Pledge, pledge(1)).await.unwrap();

    rig.monitor.set_online(true);
    let report = rig.engine.drain().await.report().copied().unwrap();
    // The remote write landed, so the pass counts it as replayed
    assert_eq!(report.replayed, 1);
    assert_eq!(rig.remote.write_count(), 1);
    assert_eq!(rig.engine.status().pending_count, 1);
}

#[tokio::test]
async fn chaos_clear_failure_notifies() {
    let store = FailingLocalStore::new(InMemoryLocalStore::new(), Target::Clear, vec![3], "readonly database");
    let rig = rig(Arc::new(store), false);
    rig.engine.save(OperationKind::Pledge, pledge(1)).await.unwrap();

    let err = rig.engine.clear_offline_data().await.unwrap_err();
    assert!(matches!(err, SyncError::Storage(StorageError::Backend(_))));
    assert!(rig.notices.contains(&Notice::ClearFailed));
    assert!(!rig.notices.contains(&Notice::OfflineDataCleared));
}

// =============================================================================
// Remote failures
// =============================================================================

#[tokio::test]
async fn chaos_remote_outage_mid_pass_then_recovery() {
    let rig = rig(Arc::new(InMemoryLocalStore::new()), false);
    for beds in 0..12 {
        rig.engine.save(OperationKind::Pledge, pledge(beds)).await.unwrap();
    }
    rig.monitor.set_online(true);

    rig.remote.set_fail_writes(true);
    let report = rig.engine.drain().await.report().copied().unwrap();
    assert_eq!(report.failed, 12);
    assert_eq!(report.batches, 2);
    assert_eq!(rig.engine.status().pending_count, 12);

    rig.remote.set_fail_writes(false);
    let report = rig.engine.drain().await.report().copied().unwrap();
    assert_eq!(report.replayed, 12);
    assert_eq!(rig.engine.status().pending_count, 0);
    assert_eq!(rig.remote.write_count(), 12);
}

#[tokio::test]
async fn chaos_connectivity_flapping_drains_once_per_reconnect() {
    let store: Arc<dyn LocalStore> = Arc::new(InMemoryLocalStore::new());
    let rig = rig(store, false);
    rig.remote.set_latency(Duration::from_millis(20));
    rig.engine.save(OperationKind::Pledge, pledge(1)).await.unwrap();

    let ctx = SyncContext::start(rig.engine).await;
    for _ in 0..5 {
        rig.monitor.set_online(true);
        rig.monitor.set_online(false);
    }
    rig.monitor.set_online(true);

    for _ in 0..200 {
        if ctx.status().pending_count == 0 && !ctx.status().is_syncing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(ctx.status().pending_count, 0);
    // Overlapping reconnect passes never replay the same operation twice
    assert_eq!(rig.remote.write_count(), 1);
    ctx.shutdown();
}
