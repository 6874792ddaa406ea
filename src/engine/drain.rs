// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Drain pass: replay the pending-operation queue in bounded batches.

use std::sync::atomic::Ordering;
use std::time::Instant;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::types::ReplayResult;
use super::{DrainGuard, DrainOutcome, DrainReport, SkipReason, SyncEngine};
use crate::notify::Notice;
use crate::record::{is_local_id, PendingOperation, Record, RecordKind};

impl SyncEngine {
    /// Run one drain pass if the engine is online, signed in and idle.
    ///
    /// Operations replay in the queue's enqueue order, `batch_size` at a
    /// time. Quarantined operations are skipped but stay counted in
    /// `pending_count`.
    #[tracing::instrument(skip(self))]
    pub async fn drain(&self) -> DrainOutcome {
        if !self.connectivity.is_online() {
            debug!("Drain skipped: offline");
            return DrainOutcome::Skipped(SkipReason::Offline);
        }
        let Some(uid) = self.auth.current_user_id() else {
            debug!("Drain skipped: no authenticated user");
            return DrainOutcome::Skipped(SkipReason::Unauthenticated);
        };
        if self.draining.swap(true, Ordering::AcqRel) {
            debug!("Drain skipped: pass already running");
            return DrainOutcome::Skipped(SkipReason::AlreadySyncing);
        }
        let _guard = DrainGuard(self);
        self.set_syncing(true);
        self.passes_started.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let queue = match self.store.pending_operations().await {
            Ok(queue) => queue,
            Err(e) => {
                error!(error = %e, "Failed to read pending operations");
                crate::metrics::record_error("local_store", "pending_operations");
                crate::metrics::record_drain_pass("aborted", start.elapsed());
                self.notifier.notify(Notice::SyncFailed);
                return DrainOutcome::Aborted(e.to_string());
            }
        };

        let active: Vec<PendingOperation> = queue.into_iter().filter(|op| !op.is_quarantined()).collect();
        if active.is_empty() {
            self.refresh_pending_count().await;
            crate::metrics::record_drain_pass("empty", start.elapsed());
            return DrainOutcome::Completed(DrainReport::default());
        }

        let batch_size = self.config.batch_size.max(1);
        info!(pending = active.len(), batch_size, "Starting drain pass");
        self.notifier.notify(Notice::SyncStarted { pending: active.len() });

        let mut report = DrainReport { total: active.len(), ..DrainReport::default() };
        for (index, batch) in active.chunks(batch_size).enumerate() {
            crate::metrics::record_batch_size(batch.len());
            debug!(batch = index, size = batch.len(), "Replaying batch");

            let results = join_all(batch.iter().map(|op| self.replay(op, &uid))).await;
            for result in results {
                match result {
                    ReplayResult::Replayed => report.replayed += 1,
                    ReplayResult::Failed => report.failed += 1,
                    ReplayResult::Quarantined => report.quarantined += 1,
                }
            }
            report.batches += 1;
        }

        let remaining = self.refresh_pending_count().await;
        let elapsed = start.elapsed();

        if report.is_success() {
            info!(replayed = report.replayed, remaining, elapsed_ms = elapsed.as_millis() as u64, "Drain pass completed");
            crate::metrics::record_drain_pass("completed", elapsed);
            self.notifier.notify(Notice::SyncCompleted { replayed: report.replayed });
        } else {
            warn!(%report, remaining, elapsed_ms = elapsed.as_millis() as u64, "Drain pass left operations queued");
            crate::metrics::record_drain_pass("incomplete", elapsed);
            self.notifier.notify(Notice::SyncIncomplete { failed: report.failed + report.quarantined });
        }

        DrainOutcome::Completed(report)
    }

    /// Replay one operation and settle its queue entry.
    async fn replay(&self, op: &PendingOperation, uid: &str) -> ReplayResult {
        let data = self.canonical(&op.data);
        let kind = op.kind.as_str();

        match self.dispatch(op.kind, &data, uid).await {
            Ok(remote_id) => {
                if let Err(e) = self.store.delete_operation(op.id).await {
                    // Stays queued and will replay again next pass
                    error!(op_id = op.id, error = %e, "Replayed operation could not be dequeued");
                    crate::metrics::record_error("local_store", "delete_operation");
                }
                self.reconcile_id(op.kind.record_kind(), &data, &remote_id).await;
                self.operations_replayed.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_replay(kind, "success");
                debug!(op_id = op.id, kind, remote_id = %remote_id, "Operation replayed");
                ReplayResult::Replayed
            }
            Err(e) => {
                let mut failed = op.clone();
                failed.data = data;
                failed.record_failure(e.to_string(), self.config.max_attempts);
                if let Err(se) = self.store.update_operation(&failed).await {
                    error!(op_id = op.id, error = %se, "Failed to record replay failure");
                    crate::metrics::record_error("local_store", "update_operation");
                }

                self.operations_failed.fetch_add(1, Ordering::Relaxed);
                if failed.is_quarantined() {
                    warn!(op_id = op.id, kind, attempts = failed.attempts, error = %e, "Operation quarantined");
                    self.operations_quarantined.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_replay(kind, "quarantined");
                    crate::metrics::record_quarantined(kind);
                    ReplayResult::Quarantined
                } else {
                    warn!(op_id = op.id, kind, attempts = failed.attempts, error = %e, "Operation replay failed");
                    crate::metrics::record_replay(kind, "failure");
                    ReplayResult::Failed
                }
            }
        }
    }

    /// Move a locally created record under its remote id.
    ///
    /// The local row keyed by the `local_` id is rewritten under the remote
    /// id, and later operations on the same record resolve through the alias
    /// map to an update instead of a second create.
    pub(super) async fn reconcile_id(&self, kind: RecordKind, data: &Record, remote_id: &str) {
        let Some(local_id) = data.id.as_deref().filter(|id| is_local_id(id)) else {
            return;
        };
        if local_id == remote_id {
            return;
        }
        self.aliases.insert(local_id.to_string(), remote_id.to_string());

        let existing = match self.store.get_record(kind, local_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                warn!(table = kind.table(), local_id, error = %e, "Could not read record for id rewrite");
                return;
            }
        };
        let mut rewritten = existing;
        rewritten.id = Some(remote_id.to_string());
        if let Err(e) = self.store.put_record(kind, &rewritten).await {
            warn!(table = kind.table(), local_id, error = %e, "Could not store record under remote id");
            return;
        }
        if let Err(e) = self.store.delete_record(kind, local_id).await {
            warn!(table = kind.table(), local_id, error = %e, "Could not drop record under local id");
        }
        debug!(table = kind.table(), local_id, remote_id, "Local id rewritten");
    }
}
