//! Remote write strategies, one per operation kind.
//!
//! Every strategy returns the id the record lives under remotely. Callers
//! use it to rewrite locally generated ids once the record exists remotely.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::SyncEngine;
use crate::record::{is_local_id, OperationKind, Record};
use crate::remote::{DocumentWrite, RemoteError};

pub(super) const REQUESTS: &str = "requests";
pub(super) const PLEDGES: &str = "pledges";
pub(super) const CONVERSATIONS: &str = "conversations";
pub(super) const USERS: &str = "users";
pub(super) const RELIEF_CENTERS: &str = "reliefCenters";

/// Sub-collection holding one conversation's messages.
pub(super) fn messages_collection(conversation_id: &str) -> String {
    format!("{}/{}/messages", CONVERSATIONS, conversation_id)
}

impl SyncEngine {
    /// Apply one record to the remote store on behalf of `uid`.
    pub(super) async fn dispatch(&self, kind: OperationKind, data: &Record, uid: &str) -> Result<String, RemoteError> {
        let _timer = crate::metrics::LatencyTimer::new("remote", "dispatch");
        match kind {
            OperationKind::Request => self.write_listing(REQUESTS, data, uid).await,
            OperationKind::Pledge => self.write_listing(PLEDGES, data, uid).await,
            OperationKind::Message => self.write_message(data, uid).await,
            OperationKind::User => self.write_user(data, uid).await,
        }
    }

    /// Requests and pledges: create when the id never reached the remote
    /// store, update otherwise.
    async fn write_listing(&self, collection: &str, data: &Record, uid: &str) -> Result<String, RemoteError> {
        let fields = data.fields.clone();
        match data.id.as_deref() {
            Some(id) if !is_local_id(id) => {
                debug!(collection, id, "Updating remote document");
                let write = DocumentWrite::new(fields).server_timestamp("lastUpdated");
                self.remote.update_document(collection, id, write).await?;
                Ok(id.to_string())
            }
            _ => {
                let write = DocumentWrite::new(fields)
                    .field("userId", uid)
                    .server_timestamp("timestamp");
                let id = self.remote.add_document(collection, write).await?;
                debug!(collection, id = %id, "Created remote document");
                Ok(id)
            }
        }
    }

    /// Messages: append to the conversation, then refresh its summary.
    async fn write_message(&self, data: &Record, uid: &str) -> Result<String, RemoteError> {
        let conversation_id = data
            .str_field("conversationId")
            .ok_or_else(|| RemoteError::InvalidPayload("message has no conversationId".to_string()))?;
        let text = data
            .str_field("text")
            .ok_or_else(|| RemoteError::InvalidPayload("message has no text".to_string()))?;

        let message = DocumentWrite::default()
            .field("text", text)
            .field("senderId", uid)
            .server_timestamp("timestamp");
        let message_id = self
            .remote
            .add_document(&messages_collection(conversation_id), message)
            .await?;

        let summary = DocumentWrite::default()
            .field("lastMessage", text)
            .field("lastMessageSenderId", uid)
            .server_timestamp("lastMessageTimestamp");
        if let Err(e) = self.remote.update_document(CONVERSATIONS, conversation_id, summary).await {
            // The message exists now; a retry would post it twice
            warn!(conversation_id, message_id = %message_id, error = %e, "Message sent but conversation summary not updated");
            crate::metrics::record_error("remote_store", "update_conversation");
        }
        Ok(message_id)
    }

    /// User profile: merge into the signed-in user's document.
    async fn write_user(&self, data: &Record, uid: &str) -> Result<String, RemoteError> {
        let fields: Map<String, Value> = data.fields.clone();
        self.remote.merge_document(USERS, uid, DocumentWrite::new(fields)).await?;
        Ok(uid.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::harness;
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_json(value).unwrap()
    }

    #[tokio::test]
    async fn test_local_request_is_created() {
        let h = harness(true);
        let data = record(json!({"id": "local_1_aaaaaaaaa", "location": "LA"}));
        let id = h.engine.dispatch(OperationKind::Request, &data, "uid-1").await.unwrap();

        assert!(!is_local_id(&id));
        let doc = h.remote.get(REQUESTS, &id).unwrap();
        assert_eq!(doc["location"], json!("LA"));
        assert_eq!(doc["userId"], json!("uid-1"));
        assert!(doc.contains_key("timestamp"));
        assert!(!doc.contains_key("id"));
    }

    #[tokio::test]
    async fn test_remote_pledge_is_updated() {
        let h = harness(true);
        h.remote.insert(PLEDGES, "p1", json!({"beds": 1}).as_object().cloned().unwrap());
        let data = record(json!({"id": "p1", "beds": 3}));
        let id = h.engine.dispatch(OperationKind::Pledge, &data, "uid-1").await.unwrap();

        assert_eq!(id, "p1");
        let doc = h.remote.get(PLEDGES, "p1").unwrap();
        assert_eq!(doc["beds"], json!(3));
        assert!(doc.contains_key("lastUpdated"));
        assert!(!doc.contains_key("userId"));
    }

    #[tokio::test]
    async fn test_update_of_missing_document_fails() {
        let h = harness(true);
        let data = record(json!({"id": "gone", "beds": 3}));
        let err = h.engine.dispatch(OperationKind::Pledge, &data, "uid-1").await.unwrap_err();
        assert!(matches!(err, RemoteError::WriteFailed(_)));
    }

    #[tokio::test]
    async fn test_message_appends_and_updates_conversation() {
        let h = harness(true);
        h.remote.insert(CONVERSATIONS, "c1", Map::new());
        let data = record(json!({"id": "local_1_aaaaaaaaa", "conversationId": "c1", "text": "hello"}));
        let id = h.engine.dispatch(OperationKind::Message, &data, "uid-1").await.unwrap();

        let message = h.remote.get(&messages_collection("c1"), &id).unwrap();
        assert_eq!(message["text"], json!("hello"));
        assert_eq!(message["senderId"], json!("uid-1"));

        let conversation = h.remote.get(CONVERSATIONS, "c1").unwrap();
        assert_eq!(conversation["lastMessage"], json!("hello"));
        assert_eq!(conversation["lastMessageSenderId"], json!("uid-1"));
        assert!(conversation.contains_key("lastMessageTimestamp"));
    }

    #[tokio::test]
    async fn test_message_to_missing_conversation_still_succeeds() {
        let h = harness(true);
        let data = record(json!({"conversationId": "c404", "text": "hello"}));
        let id = h.engine.dispatch(OperationKind::Message, &data, "uid-1").await.unwrap();

        assert!(h.remote.get(&messages_collection("c404"), &id).is_some());
        assert!(h.remote.get(CONVERSATIONS, "c404").is_none());
    }

    #[tokio::test]
    async fn test_message_without_conversation_is_invalid() {
        let h = harness(true);
        let data = record(json!({"text": "hello"}));
        let err = h.engine.dispatch(OperationKind::Message, &data, "uid-1").await.unwrap_err();
        assert!(matches!(err, RemoteError::InvalidPayload(_)));
        assert_eq!(h.remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_user_merges_into_own_document() {
        let h = harness(true);
        let data = record(json!({"id": "local_1_aaaaaaaaa", "phone": "555"}));
        let id = h.engine.dispatch(OperationKind::User, &data, "uid-1").await.unwrap();

        assert_eq!(id, "uid-1");
        assert_eq!(h.remote.get(USERS, "uid-1").unwrap()["phone"], json!("555"));
    }
}
