//! Seams to the hosted backend: document store and authentication.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote write failed: {0}")]
    WriteFailed(String),
    #[error("Remote read failed: {0}")]
    ReadFailed(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("No authenticated user")]
    Unauthenticated,
}

/// Fields for one document write.
///
/// `server_timestamps` names fields the backend fills with its own clock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentWrite {
    pub fields: Map<String, Value>,
    pub server_timestamps: Vec<String>,
}

impl DocumentWrite {
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields, server_timestamps: Vec::new() }
    }

    #[must_use]
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn server_timestamp(mut self, name: &str) -> Self {
        self.server_timestamps.push(name.to_string());
        self
    }
}

/// The hosted document store's write and list primitives.
///
/// Timeouts are the implementation's business.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a document with a backend-assigned id.
    async fn add_document(&self, collection: &str, write: DocumentWrite) -> Result<String, RemoteError>;
    /// Update an existing document. Fails when it does not exist.
    async fn update_document(&self, collection: &str, id: &str, write: DocumentWrite) -> Result<(), RemoteError>;
    /// Create or merge fields into a document.
    async fn merge_document(&self, collection: &str, id: &str, write: DocumentWrite) -> Result<(), RemoteError>;
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Map<String, Value>>, RemoteError>;
    async fn list_documents(&self, collection: &str) -> Result<Vec<(String, Map<String, Value>)>, RemoteError>;
}

/// Source of the signed-in user.
pub trait AuthProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}
