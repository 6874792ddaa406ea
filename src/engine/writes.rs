// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write paths and queue maintenance.

use tracing::{debug, error, info, warn};

use super::{SaveOutcome, SyncEngine};
use crate::error::SyncError;
use crate::notify::Notice;
use crate::record::{is_local_id, OperationKind, OperationStatus, PendingOperation, Record};
use crate::remote::RemoteError;

impl SyncEngine {
    /// Save a record, deferring it when offline.
    ///
    /// Online, the record goes straight to the remote store and is mirrored
    /// locally under its remote id; a remote or local store failure is
    /// returned as an error and nothing is queued. Offline, the record is cached and queued; a
    /// local store failure becomes [`SaveOutcome::Rejected`].
    #[tracing::instrument(skip(self, record), fields(kind = %kind))]
    pub async fn save(&self, kind: OperationKind, record: Record) -> Result<SaveOutcome, SyncError> {
        if !self.connectivity.is_online() {
            return Ok(self.save_deferred(kind, record).await);
        }
        match self.write_through(kind, &record).await {
            Ok(id) => {
                crate::metrics::record_save(kind.as_str(), "applied");
                Ok(SaveOutcome::Applied { id })
            }
            Err(e) => {
                crate::metrics::record_save(kind.as_str(), "failed");
                Err(e)
            }
        }
    }

    /// Cache the record locally and queue it for replay.
    pub async fn save_deferred(&self, kind: OperationKind, record: Record) -> SaveOutcome {
        if !self.offline_storage {
            crate::metrics::record_save(kind.as_str(), "rejected");
            return SaveOutcome::Rejected { reason: "offline storage unavailable".to_string() };
        }

        let mut record = self.canonical(&record);
        let table = kind.record_kind();
        let id = match self.store.put_record(table, &record).await {
            Ok(id) => id,
            Err(e) => return self.reject(kind, "put_record", e.to_string()),
        };
        record.id = Some(id.clone());

        let op = match self.store.enqueue(kind, &record).await {
            Ok(op) => op,
            Err(e) => return self.reject(kind, "enqueue", e.to_string()),
        };

        let pending = self.refresh_pending_count().await;
        debug!(id = %id, op_id = op.id, pending, "Saved for offline sync");
        crate::metrics::record_save(kind.as_str(), "deferred");
        SaveOutcome::Deferred { id, operation_id: op.id }
    }

    fn reject(&self, kind: OperationKind, operation: &'static str, reason: String) -> SaveOutcome {
        error!(kind = %kind, error = %reason, "Offline save failed");
        crate::metrics::record_error("local_store", operation);
        crate::metrics::record_save(kind.as_str(), "rejected");
        SaveOutcome::Rejected { reason }
    }

    /// Write to the remote store, then mirror locally under the remote id.
    async fn write_through(&self, kind: OperationKind, record: &Record) -> Result<String, SyncError> {
        let uid = self
            .auth
            .current_user_id()
            .ok_or(SyncError::RemoteWriteFailed(RemoteError::Unauthenticated))?;
        let data = self.canonical(record);
        let remote_id = self
            .dispatch(kind, &data, &uid)
            .await
            .map_err(SyncError::RemoteWriteFailed)?;

        let table = kind.record_kind();
        let local_id = data.id.as_deref().filter(|id| is_local_id(id));
        if let Some(local_id) = local_id {
            self.aliases.insert(local_id.to_string(), remote_id.clone());
        }

        let mut mirrored = data.clone();
        mirrored.id = Some(remote_id.clone());
        if let Err(e) = self.store.put_record(table, &mirrored).await {
            error!(table = table.table(), remote_id = %remote_id, error = %e, "Remote write landed but local mirror failed");
            crate::metrics::record_error("local_store", "put_record");
            return Err(e.into());
        }
        // Drop any stale copy cached under a local id
        if let Some(local_id) = local_id {
            if let Err(e) = self.store.delete_record(table, local_id).await {
                warn!(table = table.table(), local_id, error = %e, "Failed to drop record under local id");
            }
        }
        Ok(remote_id)
    }

    /// Quarantined operations, oldest first.
    pub async fn failed_operations(&self) -> Result<Vec<PendingOperation>, SyncError> {
        let queue = self.store.pending_operations().await?;
        Ok(queue.into_iter().filter(PendingOperation::is_quarantined).collect())
    }

    /// Put every quarantined operation back in line with a fresh attempt
    /// budget. Returns how many were reset.
    pub async fn retry_failed(&self) -> Result<usize, SyncError> {
        let mut reset = 0;
        for mut op in self.failed_operations().await? {
            op.attempts = 0;
            op.status = OperationStatus::Active;
            self.store.update_operation(&op).await?;
            reset += 1;
        }
        if reset > 0 {
            info!(reset, "Quarantined operations re-activated");
        }
        Ok(reset)
    }

    /// Drop one queued operation without replaying it.
    pub async fn discard_operation(&self, id: i64) -> Result<(), SyncError> {
        self.store.delete_operation(id).await?;
        self.refresh_pending_count().await;
        info!(op_id = id, "Pending operation discarded");
        Ok(())
    }

    /// Empty every local table, queue included.
    pub async fn clear_offline_data(&self) -> Result<(), SyncError> {
        match self.store.clear_all().await {
            Ok(()) => {
                self.clear_aliases();
                self.refresh_pending_count().await;
                info!("Offline data cleared");
                self.notifier.notify(Notice::OfflineDataCleared);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to clear offline data");
                crate::metrics::record_error("local_store", "clear");
                // Some tables may already be empty
                self.refresh_pending_count().await;
                self.notifier.notify(Notice::ClearFailed);
                Err(e.into())
            }
        }
    }
}
