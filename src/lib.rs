//! # OpenDoor Sync
//!
//! Offline-first persistence and synchronization core for the OpenDoor
//! Relief app. Writes made without connectivity are cached locally, queued,
//! and replayed against the hosted document store once the device is back
//! online.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SyncContext                          │
//! │  • save_for_offline / force_sync / clear_offline_data      │
//! │  • status: is_online, is_syncing, pending_count            │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   ▲
//!            ▼                                   │ transitions
//! ┌───────────────────────────┐     ┌───────────────────────────┐
//! │        SyncEngine         │     │    ConnectivityMonitor    │
//! │  • drain in batches of 10 │◄────│  • online / offline       │
//! │  • per-kind dispatch      │     │  • handler registry       │
//! │  • quarantine after 5     │     └───────────────────────────┘
//! └───────────────────────────┘
//!            │                  │
//!            ▼                  ▼
//! ┌──────────────────┐  ┌──────────────────────────────────────┐
//! │   RemoteStore    │  │             LocalStore               │
//! │  (hosted docs)   │  │  requests, pledges, messages,        │
//! └──────────────────┘  │  userData, reliefCenters,            │
//!                       │  pendingUploads (SQLite / memory)    │
//!                       └──────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use opendoor_sync::{
//!     ConnectivityMonitor, InMemoryRemote, OfflineSyncConfig, OperationKind,
//!     Record, StaticAuth, SyncContext, TracingNotifier,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let monitor = Arc::new(ConnectivityMonitor::new(false));
//!     let ctx = SyncContext::open(
//!         OfflineSyncConfig::default(),
//!         Arc::new(InMemoryRemote::new()),
//!         Arc::new(StaticAuth::signed_in("uid-1")),
//!         monitor.clone(),
//!         Arc::new(TracingNotifier),
//!     )
//!     .await;
//!
//!     // Offline: cached and queued under a local id
//!     let pledge = Record::from_json(json!({"beds": 2, "city": "Reno"})).unwrap();
//!     let outcome = ctx.save_for_offline(OperationKind::Pledge, pledge).await.unwrap();
//!     println!("saved as {:?}", outcome.id());
//!
//!     // Back online: the queue drains in the background
//!     monitor.set_online(true);
//!
//!     ctx.shutdown();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`context`]: The [`SyncContext`] facade the UI talks to
//! - [`engine`]: Drain passes, remote dispatch, cache refresh
//! - [`connectivity`]: Online/offline state and change handlers
//! - [`storage`]: Local store trait, SQLite and in-memory backends
//! - [`remote`]: Document store and auth seams
//! - [`notify`]: User-facing notices
//! - [`resilience`]: Retry for opening the local store

pub mod config;
pub mod record;
pub mod error;
pub mod storage;
pub mod remote;
pub mod notify;
pub mod connectivity;
pub mod engine;
pub mod context;
pub mod resilience;
pub mod metrics;

pub use config::OfflineSyncConfig;
pub use record::{generate_local_id, is_local_id, OperationKind, OperationStatus, PendingOperation, Record, RecordKind};
pub use error::SyncError;
pub use storage::traits::{LocalStore, RecordIndex, StorageError, Table};
pub use storage::memory::InMemoryLocalStore;
pub use storage::sqlite::SqliteLocalStore;
pub use remote::{AuthProvider, DocumentWrite, InMemoryRemote, RemoteError, RemoteStore, StaticAuth, WriteEvent};
pub use notify::{pending_label, Notice, Notifier, RecordingNotifier, TracingNotifier};
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor, Subscription};
pub use engine::{DrainOutcome, DrainReport, SaveOutcome, SkipReason, SyncEngine, SyncStats, SyncStatus};
pub use context::SyncContext;
pub use resilience::retry::RetryConfig;
pub use metrics::LatencyTimer;
