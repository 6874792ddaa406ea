//! Cache refresh: pull remote documents into the local tables.
//!
//! Reads fall back to the local snapshot when offline or when the remote
//! read fails, so list screens keep rendering. A remote failure with nothing
//! cached is an error.

use tracing::{debug, warn};

use super::dispatch::{messages_collection, PLEDGES, RELIEF_CENTERS, REQUESTS, USERS};
use super::SyncEngine;
use crate::error::SyncError;
use crate::record::{Record, RecordKind};
use crate::remote::RemoteError;
use crate::storage::traits::RecordIndex;
use serde_json::{Map, Value};

impl SyncEngine {
    /// Records of `kind`, fresh from the remote store when possible.
    ///
    /// Messages are scoped to a conversation; use
    /// [`SyncEngine::refresh_conversation`] for those. Refreshing
    /// [`RecordKind::Message`] returns the local snapshot.
    #[tracing::instrument(skip(self), fields(table = kind.table()))]
    pub async fn refresh(&self, kind: RecordKind) -> Result<Vec<Record>, SyncError> {
        if !self.connectivity.is_online() {
            return self.local_snapshot(kind).await;
        }

        let fetched = match kind {
            RecordKind::Request => self.remote.list_documents(REQUESTS).await,
            RecordKind::Pledge => self.remote.list_documents(PLEDGES).await,
            RecordKind::ReliefCenter => self.remote.list_documents(RELIEF_CENTERS).await,
            RecordKind::UserData => match self.auth.current_user_id() {
                Some(uid) => self
                    .remote
                    .get_document(USERS, &uid)
                    .await
                    .map(|doc| doc.map(|fields| vec![(uid, fields)]).unwrap_or_default()),
                None => return self.local_snapshot(kind).await,
            },
            RecordKind::Message => return self.local_snapshot(kind).await,
        };

        self.absorb(kind, fetched, None).await
    }

    /// One conversation's messages, fresh from the remote store when possible.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_conversation(&self, conversation_id: &str) -> Result<Vec<Record>, SyncError> {
        if !self.connectivity.is_online() {
            return self.cached_conversation(conversation_id).await;
        }
        let fetched = self.remote.list_documents(&messages_collection(conversation_id)).await;
        self.absorb(RecordKind::Message, fetched, Some(conversation_id)).await
    }

    /// Locally cached messages of one conversation.
    pub async fn cached_conversation(&self, conversation_id: &str) -> Result<Vec<Record>, SyncError> {
        Ok(self
            .store
            .records_by_index(RecordKind::Message, RecordIndex::ConversationId, conversation_id)
            .await?)
    }

    async fn local_snapshot(&self, kind: RecordKind) -> Result<Vec<Record>, SyncError> {
        debug!(table = kind.table(), "Serving local snapshot");
        crate::metrics::record_refresh(kind.table(), "local");
        Ok(self.store.all_records(kind).await?)
    }

    /// Upsert fetched documents into the cache, or fall back to it.
    async fn absorb(
        &self,
        kind: RecordKind,
        fetched: Result<Vec<(String, Map<String, Value>)>, RemoteError>,
        conversation_id: Option<&str>,
    ) -> Result<Vec<Record>, SyncError> {
        let docs = match fetched {
            Ok(docs) => docs,
            Err(e) => {
                warn!(table = kind.table(), error = %e, "Remote read failed, using local cache");
                let cached = match conversation_id {
                    Some(cid) => self.cached_conversation(cid).await?,
                    None => self.store.all_records(kind).await?,
                };
                if cached.is_empty() {
                    crate::metrics::record_refresh(kind.table(), "error");
                    return Err(SyncError::RemoteReadFailed(e));
                }
                crate::metrics::record_refresh(kind.table(), "local_fallback");
                return Ok(cached);
            }
        };

        let mut records = Vec::with_capacity(docs.len());
        for (id, fields) in docs {
            let mut record = Record::with_id(id, fields);
            if let Some(cid) = conversation_id {
                record.fields.insert("conversationId".to_string(), Value::from(cid));
            }
            if let Err(e) = self.store.put_record(kind, &record).await {
                // The caller still gets fresh data; the cache just lags
                warn!(table = kind.table(), error = %e, "Failed to cache remote record");
                crate::metrics::record_error("local_store", "put_record");
            }
            records.push(record);
        }

        debug!(table = kind.table(), count = records.len(), "Cache refreshed from remote");
        crate::metrics::record_refresh(kind.table(), "remote");
        Ok(records)
    }
}
