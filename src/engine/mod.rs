// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine: drains the pending-operation queue to the remote store.
//!
//! The [`SyncEngine`] ties together:
//! - the [`LocalStore`] holding cached records and the queue
//! - the [`RemoteStore`] writes are replayed against
//! - the [`ConnectivityMonitor`] gating every pass
//! - a [`Notifier`] for user-facing toasts
//!
//! # Drain pass
//!
//! ```text
//! Idle → (online ∧ signed in ∧ not draining) → Syncing → batches of N → Idle
//! ```
//!
//! Batches run one after another; the operations inside a batch are replayed
//! concurrently. A failed operation stays queued with its attempt count
//! bumped, and is quarantined once it reaches `max_attempts`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use opendoor_sync::{
//!     ConnectivityMonitor, InMemoryLocalStore, InMemoryRemote, OfflineSyncConfig,
//!     StaticAuth, SyncEngine,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = SyncEngine::new(
//!     OfflineSyncConfig::default(),
//!     Arc::new(InMemoryLocalStore::new()),
//!     Arc::new(InMemoryRemote::new()),
//!     Arc::new(StaticAuth::signed_in("uid-1")),
//!     Arc::new(ConnectivityMonitor::new(true)),
//! );
//!
//! let outcome = engine.drain().await;
//! println!("{:?}", outcome);
//! # }
//! ```

mod types;
mod dispatch;
mod drain;
mod refresh;
mod writes;

pub use types::{DrainOutcome, DrainReport, SaveOutcome, SkipReason, SyncStats, SyncStatus};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::OfflineSyncConfig;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::record::{is_local_id, Record};
use crate::remote::{AuthProvider, RemoteStore};
use crate::storage::traits::LocalStore;

pub struct SyncEngine {
    pub(super) config: OfflineSyncConfig,

    pub(super) store: Arc<dyn LocalStore>,

    pub(super) remote: Arc<dyn RemoteStore>,

    pub(super) auth: Arc<dyn AuthProvider>,

    pub(super) connectivity: Arc<ConnectivityMonitor>,

    pub(super) notifier: Arc<dyn Notifier>,

    /// Status broadcast to the UI
    pub(super) status: watch::Sender<SyncStatus>,

    /// Set while a drain pass runs
    pub(super) draining: AtomicBool,

    /// False when the durable store could not be opened and `store` is a
    /// throwaway in-memory cache
    pub(super) offline_storage: bool,

    /// Local id -> remote id for records created during this session
    pub(super) aliases: DashMap<String, String>,

    pub(super) passes_started: AtomicU64,
    pub(super) operations_replayed: AtomicU64,
    pub(super) operations_failed: AtomicU64,
    pub(super) operations_quarantined: AtomicU64,
}

impl SyncEngine {
    /// Create an engine. Nothing runs until a drain is requested.
    pub fn new(
        config: OfflineSyncConfig,
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus {
            is_online: connectivity.is_online(),
            ..SyncStatus::default()
        });

        Self {
            config,
            store,
            remote,
            auth,
            connectivity,
            notifier: Arc::new(TracingNotifier),
            status,
            draining: AtomicBool::new(false),
            offline_storage: true,
            aliases: DashMap::new(),
            passes_started: AtomicU64::new(0),
            operations_replayed: AtomicU64::new(0),
            operations_failed: AtomicU64::new(0),
            operations_quarantined: AtomicU64::new(0),
        }
    }

    /// Route user notices somewhere other than the log.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Mark the local store as ephemeral; offline saves will be rejected.
    #[must_use]
    pub fn without_offline_storage(mut self) -> Self {
        self.offline_storage = false;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OfflineSyncConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    #[must_use]
    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    #[must_use]
    pub fn has_offline_storage(&self) -> bool {
        self.offline_storage
    }

    /// Current status; `is_online` is read live from the monitor.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            is_online: self.connectivity.is_online(),
            ..*self.status.borrow()
        }
    }

    /// Watch status changes.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            passes_started: self.passes_started.load(Ordering::Relaxed),
            operations_replayed: self.operations_replayed.load(Ordering::Relaxed),
            operations_failed: self.operations_failed.load(Ordering::Relaxed),
            operations_quarantined: self.operations_quarantined.load(Ordering::Relaxed),
        }
    }

    /// Hand a notice to the UI layer.
    pub fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    /// React to a connectivity transition: update status, tell the user and
    /// drain when coming back online.
    pub async fn handle_connectivity(&self, event: ConnectivityEvent) -> Option<DrainOutcome> {
        let online = event == ConnectivityEvent::Online;
        self.status.send_if_modified(|s| {
            let changed = s.is_online != online;
            s.is_online = online;
            changed
        });
        crate::metrics::set_online(online);

        match event {
            ConnectivityEvent::Online => {
                if self.config.notify_on_connectivity {
                    self.notifier.notify(Notice::BackOnline);
                }
                Some(self.drain().await)
            }
            ConnectivityEvent::Offline => {
                if self.config.notify_on_connectivity {
                    self.notifier.notify(Notice::WentOffline);
                }
                None
            }
        }
    }

    /// Re-read the queue size into the status. Returns the new count.
    pub async fn refresh_pending_count(&self) -> usize {
        match self.store.count_operations().await {
            Ok(count) => {
                self.status.send_if_modified(|s| {
                    let changed = s.pending_count != count;
                    s.pending_count = count;
                    changed
                });
                crate::metrics::set_pending_operations(count);
                count
            }
            Err(e) => {
                warn!(error = %e, "Failed to count pending operations");
                crate::metrics::record_error("local_store", "count");
                self.status.borrow().pending_count
            }
        }
    }

    pub(super) fn set_syncing(&self, syncing: bool) {
        self.status.send_if_modified(|s| {
            let changed = s.is_syncing != syncing;
            s.is_syncing = syncing;
            changed
        });
    }

    /// Replace a session-local id with the remote id it was created under.
    pub(super) fn canonical(&self, record: &Record) -> Record {
        let mut record = record.clone();
        if let Some(remote_id) = record
            .id
            .as_deref()
            .filter(|id| is_local_id(id))
            .and_then(|id| self.aliases.get(id).map(|r| r.value().clone()))
        {
            debug!(remote_id = %remote_id, "Resolved local id alias");
            record.id = Some(remote_id);
        }
        record
    }

    /// Forget session aliases (after the local data was cleared).
    pub(super) fn clear_aliases(&self) {
        self.aliases.clear();
    }
}

/// Resets the draining flag and the syncing status when a pass ends,
/// including on early return.
pub(super) struct DrainGuard<'a>(&'a SyncEngine);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set_syncing(false);
        self.0.draining.store(false, Ordering::Release);
    }
}
