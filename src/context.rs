// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync context: the one object the UI layer talks to.
//!
//! A [`SyncContext`] owns the [`SyncEngine`] and a background task that
//! follows the [`ConnectivityMonitor`]. Coming back online triggers a drain
//! pass and a "back online" notice; going offline only notifies.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use opendoor_sync::{
//!     ConnectivityMonitor, InMemoryRemote, OfflineSyncConfig, OperationKind,
//!     Record, StaticAuth, SyncContext, TracingNotifier,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let monitor = Arc::new(ConnectivityMonitor::new(false));
//! let ctx = SyncContext::open(
//!     OfflineSyncConfig::default(),
//!     Arc::new(InMemoryRemote::new()),
//!     Arc::new(StaticAuth::signed_in("uid-1")),
//!     monitor.clone(),
//!     Arc::new(TracingNotifier),
//! )
//! .await;
//!
//! let record = Record::from_json(json!({"location": "LA", "beds": 2})).unwrap();
//! ctx.save_for_offline(OperationKind::Request, record).await.unwrap();
//! assert_eq!(ctx.status().pending_count, 1);
//!
//! monitor.set_online(true); // drains in the background
//! ctx.shutdown();
//! # }
//! ```

use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::OfflineSyncConfig;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::engine::{DrainOutcome, SaveOutcome, SkipReason, SyncEngine, SyncStats, SyncStatus};
use crate::error::SyncError;
use crate::notify::{Notice, Notifier};
use crate::record::{OperationKind, PendingOperation, Record, RecordKind};
use crate::remote::{AuthProvider, RemoteStore};
use crate::storage::memory::InMemoryLocalStore;
use crate::storage::sqlite::SqliteLocalStore;
use crate::storage::traits::LocalStore;

pub struct SyncContext {
    engine: Arc<SyncEngine>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SyncContext {
    /// Open the durable local store and start following connectivity.
    ///
    /// When the store cannot be opened the context still starts: records are
    /// cached in memory for this session only and offline saves are rejected.
    pub async fn open(
        config: OfflineSyncConfig,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
        connectivity: Arc<ConnectivityMonitor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (store, durable): (Arc<dyn LocalStore>, bool) = match SqliteLocalStore::open(&config).await {
            Ok(store) => (Arc::new(store), true),
            Err(e) => {
                warn!(error = %e, "Offline storage unavailable, continuing remote-only");
                crate::metrics::record_error("local_store", "open");
                (Arc::new(InMemoryLocalStore::new()), false)
            }
        };

        let mut engine = SyncEngine::new(config, store, remote, auth, connectivity).with_notifier(notifier);
        if !durable {
            engine = engine.without_offline_storage();
        }
        Self::start(engine).await
    }

    /// Take ownership of an engine, publish its initial status and spawn the
    /// connectivity listener. Must be called inside a Tokio runtime.
    pub async fn start(engine: SyncEngine) -> Self {
        let engine = Arc::new(engine);
        let pending = engine.refresh_pending_count().await;
        crate::metrics::set_online(engine.connectivity().is_online());
        info!(pending, online = engine.connectivity().is_online(), "Sync context started");

        // Subscribe before spawning so a transition racing the first poll is kept
        let rx = engine.connectivity().subscribe();
        let listener = tokio::spawn(Self::follow_connectivity(engine.clone(), rx));
        Self {
            engine,
            listener: Mutex::new(Some(listener)),
        }
    }

    async fn follow_connectivity(engine: Arc<SyncEngine>, mut rx: watch::Receiver<bool>) {
        while rx.changed().await.is_ok() {
            let online = *rx.borrow_and_update();
            let outcome = engine.handle_connectivity(ConnectivityEvent::from_online(online)).await;
            if let Some(outcome) = outcome {
                debug!(?outcome, "Reconnect drain finished");
            }
        }
        debug!("Connectivity listener stopped");
    }

    /// Stop following connectivity. Queued operations stay queued.
    pub fn shutdown(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
            info!("Sync context shut down");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.listener.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.engine.status()
    }

    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<SyncStatus> {
        self.engine.status_receiver()
    }

    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.engine.stats()
    }

    /// Save a record; queued when offline, written through when online.
    pub async fn save_for_offline(&self, kind: OperationKind, record: Record) -> Result<SaveOutcome, SyncError> {
        self.engine.save(kind, record).await
    }

    /// Drain now. Offline, the user is told to connect first.
    pub async fn force_sync(&self) -> DrainOutcome {
        if !self.engine.connectivity().is_online() {
            self.engine.notify(Notice::OfflineForceSync);
            return DrainOutcome::Skipped(SkipReason::Offline);
        }
        self.engine.drain().await
    }

    pub async fn clear_offline_data(&self) -> Result<(), SyncError> {
        self.engine.clear_offline_data().await
    }

    /// Records of `kind`, refreshed from the remote store when online.
    pub async fn refresh(&self, kind: RecordKind) -> Result<Vec<Record>, SyncError> {
        self.engine.refresh(kind).await
    }

    pub async fn refresh_conversation(&self, conversation_id: &str) -> Result<Vec<Record>, SyncError> {
        self.engine.refresh_conversation(conversation_id).await
    }

    /// Cached records of `kind`, no network.
    pub async fn records(&self, kind: RecordKind) -> Result<Vec<Record>, SyncError> {
        Ok(self.engine.store().all_records(kind).await?)
    }

    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<Record>, SyncError> {
        self.engine.cached_conversation(conversation_id).await
    }

    pub async fn failed_operations(&self) -> Result<Vec<PendingOperation>, SyncError> {
        self.engine.failed_operations().await
    }

    pub async fn retry_failed(&self) -> Result<usize, SyncError> {
        self.engine.retry_failed().await
    }

    pub async fn discard_operation(&self, id: i64) -> Result<(), SyncError> {
        self.engine.discard_operation(id).await
    }
}

impl Drop for SyncContext {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}
