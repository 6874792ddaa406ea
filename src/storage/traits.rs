use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use crate::record::{OperationKind, PendingOperation, Record, RecordKind};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Local store unavailable: {0}")]
    Unavailable(String),
    #[error("Table '{table}' has no index '{index}'")]
    NoSuchIndex {
        table: &'static str,
        index: &'static str,
    },
    #[error("Corrupt row in '{table}': {reason}")]
    Serialization {
        table: &'static str,
        reason: String,
    },
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Name of the local database.
pub const DB_NAME: &str = "OpenDoorReliefDB";

/// Schema version stamped on the local database.
pub const SCHEMA_VERSION: i64 = 1;

/// One of the six local tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Records(RecordKind),
    PendingUploads,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Records(RecordKind::Request),
        Table::Records(RecordKind::Pledge),
        Table::Records(RecordKind::Message),
        Table::Records(RecordKind::UserData),
        Table::Records(RecordKind::ReliefCenter),
        Table::PendingUploads,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Records(kind) => kind.table(),
            Self::PendingUploads => "pendingUploads",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Secondary indexes on record tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordIndex {
    /// `messages.conversationId`
    ConversationId,
}

impl RecordIndex {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConversationId => "conversationId",
        }
    }

    /// Whether this index was provisioned on `kind`'s table.
    #[must_use]
    pub fn applies_to(&self, kind: RecordKind) -> bool {
        matches!((self, kind), (Self::ConversationId, RecordKind::Message))
    }
}

/// Durable key-value persistence: one table per record kind plus the
/// pending-operation queue.
///
/// Every call is its own short transaction on a single table. Nothing spans
/// tables atomically.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert or overwrite by id, synthesizing a local id when absent.
    async fn put_record(&self, kind: RecordKind, record: &Record) -> Result<String, StorageError>;
    async fn get_record(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StorageError>;
    async fn all_records(&self, kind: RecordKind) -> Result<Vec<Record>, StorageError>;
    async fn records_by_index(
        &self,
        kind: RecordKind,
        index: RecordIndex,
        value: &str,
    ) -> Result<Vec<Record>, StorageError>;
    /// Idempotent.
    async fn delete_record(&self, kind: RecordKind, id: &str) -> Result<(), StorageError>;

    /// Append a deferred write. `data` must already carry its id.
    async fn enqueue(&self, kind: OperationKind, data: &Record) -> Result<PendingOperation, StorageError>;
    /// Whole queue in enqueue order, quarantined entries included.
    async fn pending_operations(&self) -> Result<Vec<PendingOperation>, StorageError>;
    async fn operations_by_type(&self, kind: OperationKind) -> Result<Vec<PendingOperation>, StorageError>;
    /// Operations enqueued at or after `timestamp` (epoch millis).
    async fn operations_since(&self, timestamp: i64) -> Result<Vec<PendingOperation>, StorageError>;
    async fn update_operation(&self, op: &PendingOperation) -> Result<(), StorageError>;
    /// Idempotent.
    async fn delete_operation(&self, id: i64) -> Result<(), StorageError>;
    async fn count_operations(&self) -> Result<usize, StorageError>;

    /// Remove every row from one table.
    async fn clear(&self, table: Table) -> Result<(), StorageError>;

    /// Clear all six tables.
    async fn clear_all(&self) -> Result<(), StorageError> {
        for table in Table::ALL {
            self.clear(table).await?;
        }
        Ok(())
    }
}
