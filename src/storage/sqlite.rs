// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite-backed local store.
//!
//! One SQLite file holds the whole `OpenDoorReliefDB` database. Record tables
//! store the JSON document in a `payload` column keyed by `id`; the messages
//! table also carries `conversation_id` so lookups by conversation use an
//! index instead of scanning:
//!
//! ```sql
//! CREATE TABLE requests      (id TEXT PRIMARY KEY, payload TEXT NOT NULL);
//! CREATE TABLE messages      (id TEXT PRIMARY KEY, conversation_id TEXT, payload TEXT NOT NULL);
//! CREATE TABLE pendingUploads (
//!   id INTEGER PRIMARY KEY AUTOINCREMENT,
//!   type TEXT NOT NULL,
//!   timestamp INTEGER NOT NULL,
//!   attempts INTEGER NOT NULL DEFAULT 0,
//!   status TEXT NOT NULL DEFAULT 'active',
//!   last_error TEXT,
//!   data TEXT NOT NULL
//! );
//! ```
//!
//! The schema version lives in `PRAGMA user_version`. Tables are provisioned
//! once, when the file reports version 0.

use std::path::Path;
use std::time::Duration;
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::config::OfflineSyncConfig;
use crate::record::{now_millis, OperationKind, OperationStatus, PendingOperation, Record, RecordKind};
use crate::resilience::retry::{retry, RetryConfig};
use super::traits::{LocalStore, RecordIndex, StorageError, Table, DB_NAME, SCHEMA_VERSION};

const SCHEMA_V1: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS "requests" (id TEXT PRIMARY KEY, payload TEXT NOT NULL)"#,
    r#"CREATE TABLE IF NOT EXISTS "pledges" (id TEXT PRIMARY KEY, payload TEXT NOT NULL)"#,
    r#"CREATE TABLE IF NOT EXISTS "messages" (
        id TEXT PRIMARY KEY,
        conversation_id TEXT,
        payload TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON "messages" (conversation_id)"#,
    r#"CREATE TABLE IF NOT EXISTS "userData" (id TEXT PRIMARY KEY, payload TEXT NOT NULL)"#,
    r#"CREATE TABLE IF NOT EXISTS "reliefCenters" (id TEXT PRIMARY KEY, payload TEXT NOT NULL)"#,
    r#"CREATE TABLE IF NOT EXISTS "pendingUploads" (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'active',
        last_error TEXT,
        data TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_pending_type ON "pendingUploads" (type)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_pending_timestamp ON "pendingUploads" (timestamp)"#,
];

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

pub struct SqliteLocalStore {
    pool: SqlitePool,
    path: String,
}

impl SqliteLocalStore {
    /// Open (or create) the local database described by `config`.
    ///
    /// Connecting uses the startup retry preset; a store that still cannot be
    /// opened is reported as [`StorageError::Unavailable`].
    pub async fn open(config: &OfflineSyncConfig) -> Result<Self, StorageError> {
        Self::open_with_retry(config, &RetryConfig::startup()).await
    }

    /// Open a database file with default pool settings.
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let config = OfflineSyncConfig {
            db_path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        };
        Self::open(&config).await
    }

    pub async fn open_with_retry(
        config: &OfflineSyncConfig,
        retry_config: &RetryConfig,
    ) -> Result<Self, StorageError> {
        let path = config.db_path.clone();
        info!(db = DB_NAME, path = %path, "Opening local store");

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let max_connections = config.max_connections.max(1);
        let pool = retry("local_store_open", retry_config, || {
            let options = options.clone();
            async move {
                SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect_with(options)
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))
            }
        })
        .await?;

        let store = Self { pool, path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        if version == SCHEMA_VERSION {
            debug!(version, "Local store schema up to date");
            return Ok(());
        }
        if version > SCHEMA_VERSION {
            return Err(StorageError::Unavailable(format!(
                "{} schema version {} is newer than supported version {}",
                DB_NAME, version, SCHEMA_VERSION
            )));
        }

        let mut tx = self.pool.begin().await.map_err(backend)?;
        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await.map_err(backend)?;
        }
        // PRAGMA does not accept bind parameters
        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        info!(version = SCHEMA_VERSION, "Local store schema provisioned");
        Ok(())
    }

    /// Path of the SQLite file.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get a clone of the connection pool.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn decode_record(table: &'static str, row: &SqliteRow) -> Result<Record, StorageError> {
        let payload: String = row.try_get("payload").map_err(backend)?;
        serde_json::from_str(&payload).map_err(|e| StorageError::Serialization {
            table,
            reason: e.to_string(),
        })
    }

    fn decode_records(table: &'static str, rows: &[SqliteRow]) -> Result<Vec<Record>, StorageError> {
        rows.iter().map(|row| Self::decode_record(table, row)).collect()
    }

    fn decode_operation(row: &SqliteRow) -> Result<PendingOperation, StorageError> {
        let corrupt = |reason: String| StorageError::Serialization { table: Table::PendingUploads.name(), reason };

        let kind: String = row.try_get("type").map_err(backend)?;
        let status: String = row.try_get("status").map_err(backend)?;
        let data: String = row.try_get("data").map_err(backend)?;
        let attempts: i64 = row.try_get("attempts").map_err(backend)?;

        Ok(PendingOperation {
            id: row.try_get("id").map_err(backend)?,
            kind: kind.parse().map_err(corrupt)?,
            data: serde_json::from_str(&data).map_err(|e| corrupt(e.to_string()))?,
            timestamp: row.try_get("timestamp").map_err(backend)?,
            attempts: u32::try_from(attempts).unwrap_or(0),
            status: status.parse().map_err(corrupt)?,
            last_error: row.try_get("last_error").map_err(backend)?,
        })
    }

    async fn query_operations(
        &self,
        sql: &str,
        bind: Option<QueueFilter<'_>>,
    ) -> Result<Vec<PendingOperation>, StorageError> {
        let query = sqlx::query(sql);
        let query = match bind {
            Some(QueueFilter::Type(kind)) => query.bind(kind),
            Some(QueueFilter::Since(ts)) => query.bind(ts),
            None => query,
        };
        let rows = query.fetch_all(&self.pool).await.map_err(backend)?;
        rows.iter().map(Self::decode_operation).collect()
    }
}

enum QueueFilter<'a> {
    Type(&'a str),
    Since(i64),
}

const QUEUE_COLUMNS: &str = "id, type, timestamp, attempts, status, last_error, data";

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn put_record(&self, kind: RecordKind, record: &Record) -> Result<String, StorageError> {
        let mut record = record.clone();
        let id = record.ensure_id().to_string();
        let payload = serde_json::to_string(&record).map_err(|e| StorageError::Serialization {
            table: kind.table(),
            reason: e.to_string(),
        })?;

        match kind {
            RecordKind::Message => {
                let conversation_id = record.str_field(RecordIndex::ConversationId.name());
                sqlx::query(
                    r#"INSERT OR REPLACE INTO "messages" (id, conversation_id, payload) VALUES (?, ?, ?)"#,
                )
                .bind(&id)
                .bind(conversation_id)
                .bind(&payload)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
            }
            _ => {
                let sql = format!(r#"INSERT OR REPLACE INTO "{}" (id, payload) VALUES (?, ?)"#, kind.table());
                sqlx::query(&sql)
                    .bind(&id)
                    .bind(&payload)
                    .execute(&self.pool)
                    .await
                    .map_err(backend)?;
            }
        }

        debug!(table = kind.table(), id = %id, "Record stored locally");
        Ok(id)
    }

    async fn get_record(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StorageError> {
        let sql = format!(r#"SELECT payload FROM "{}" WHERE id = ?"#, kind.table());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| Self::decode_record(kind.table(), &r)).transpose()
    }

    async fn all_records(&self, kind: RecordKind) -> Result<Vec<Record>, StorageError> {
        let sql = format!(r#"SELECT payload FROM "{}""#, kind.table());
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await.map_err(backend)?;
        Self::decode_records(kind.table(), &rows)
    }

    async fn records_by_index(
        &self,
        kind: RecordKind,
        index: RecordIndex,
        value: &str,
    ) -> Result<Vec<Record>, StorageError> {
        if !index.applies_to(kind) {
            return Err(StorageError::NoSuchIndex { table: kind.table(), index: index.name() });
        }
        let rows = match index {
            RecordIndex::ConversationId => {
                sqlx::query(r#"SELECT payload FROM "messages" WHERE conversation_id = ?"#)
                    .bind(value)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(backend)?
            }
        };
        Self::decode_records(kind.table(), &rows)
    }

    async fn delete_record(&self, kind: RecordKind, id: &str) -> Result<(), StorageError> {
        let sql = format!(r#"DELETE FROM "{}" WHERE id = ?"#, kind.table());
        sqlx::query(&sql).bind(id).execute(&self.pool).await.map_err(backend)?;
        Ok(())
    }

    async fn enqueue(&self, kind: OperationKind, data: &Record) -> Result<PendingOperation, StorageError> {
        let payload = serde_json::to_string(data).map_err(|e| StorageError::Serialization {
            table: Table::PendingUploads.name(),
            reason: e.to_string(),
        })?;
        let timestamp = now_millis();

        let result = sqlx::query(
            r#"INSERT INTO "pendingUploads" (type, timestamp, attempts, status, data) VALUES (?, ?, 0, 'active', ?)"#,
        )
        .bind(kind.as_str())
        .bind(timestamp)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        let op = PendingOperation {
            id: result.last_insert_rowid(),
            kind,
            data: data.clone(),
            timestamp,
            attempts: 0,
            status: OperationStatus::Active,
            last_error: None,
        };
        debug!(op_id = op.id, kind = %kind, "Pending operation queued");
        Ok(op)
    }

    async fn pending_operations(&self) -> Result<Vec<PendingOperation>, StorageError> {
        let sql = format!(r#"SELECT {} FROM "pendingUploads" ORDER BY id"#, QUEUE_COLUMNS);
        self.query_operations(&sql, None).await
    }

    async fn operations_by_type(&self, kind: OperationKind) -> Result<Vec<PendingOperation>, StorageError> {
        let sql = format!(r#"SELECT {} FROM "pendingUploads" WHERE type = ? ORDER BY id"#, QUEUE_COLUMNS);
        self.query_operations(&sql, Some(QueueFilter::Type(kind.as_str()))).await
    }

    async fn operations_since(&self, timestamp: i64) -> Result<Vec<PendingOperation>, StorageError> {
        let sql = format!(
            r#"SELECT {} FROM "pendingUploads" WHERE timestamp >= ? ORDER BY timestamp, id"#,
            QUEUE_COLUMNS
        );
        self.query_operations(&sql, Some(QueueFilter::Since(timestamp))).await
    }

    async fn update_operation(&self, op: &PendingOperation) -> Result<(), StorageError> {
        let data = serde_json::to_string(&op.data).map_err(|e| StorageError::Serialization {
            table: Table::PendingUploads.name(),
            reason: e.to_string(),
        })?;
        let result = sqlx::query(
            r#"UPDATE "pendingUploads" SET attempts = ?, status = ?, last_error = ?, data = ? WHERE id = ?"#,
        )
        .bind(i64::from(op.attempts))
        .bind(op.status.as_str())
        .bind(op.last_error.as_deref())
        .bind(&data)
        .bind(op.id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            warn!(op_id = op.id, "Update for pending operation that is no longer queued");
        }
        Ok(())
    }

    async fn delete_operation(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query(r#"DELETE FROM "pendingUploads" WHERE id = ?"#)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn count_operations(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "pendingUploads""#)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn clear(&self, table: Table) -> Result<(), StorageError> {
        let sql = format!(r#"DELETE FROM "{}""#, table.name());
        sqlx::query(&sql).execute(&self.pool).await.map_err(backend)?;
        info!(table = %table, "Local table cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(value: serde_json::Value) -> Record {
        Record::from_json(value).unwrap()
    }

    #[tokio::test]
    async fn test_open_provisions_schema() {
        let dir = tempdir().unwrap();
        let store = SqliteLocalStore::open_path(dir.path().join("relief.sqlite")).await.unwrap();

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&store.pool())
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let indexes: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'")
                .fetch_all(&store.pool())
                .await
                .unwrap();
        assert!(indexes.contains(&"idx_messages_conversation_id".to_string()));
        assert!(indexes.contains(&"idx_pending_type".to_string()));
        assert!(indexes.contains(&"idx_pending_timestamp".to_string()));
    }

    #[tokio::test]
    async fn test_open_is_idempotent_and_durable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relief.sqlite");

        {
            let store = SqliteLocalStore::open_path(&path).await.unwrap();
            store.put_record(RecordKind::Request, &record(json!({"id": "r1", "location": "LA"}))).await.unwrap();
            store.enqueue(OperationKind::Request, &record(json!({"id": "r1"}))).await.unwrap();
            store.close().await;
        }

        let store = SqliteLocalStore::open_path(&path).await.unwrap();
        let stored = store.get_record(RecordKind::Request, "r1").await.unwrap().unwrap();
        assert_eq!(stored.str_field("location"), Some("LA"));
        assert_eq!(store.count_operations().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_queue_row_names_pending_table() {
        let dir = tempdir().unwrap();
        let store = SqliteLocalStore::open_path(dir.path().join("relief.sqlite")).await.unwrap();
        sqlx::query(r#"INSERT INTO "pendingUploads" (type, timestamp, data) VALUES ('teleport', 1, '{}')"#)
            .execute(&store.pool())
            .await
            .unwrap();

        let err = store.pending_operations().await.unwrap_err();
        match err {
            StorageError::Serialization { table, .. } => assert_eq!(table, Table::PendingUploads.name()),
            other => panic!("expected a serialization error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_unavailable_directory() {
        let dir = tempdir().unwrap();
        let config = OfflineSyncConfig {
            db_path: dir.path().join("missing").join("relief.sqlite").to_string_lossy().to_string(),
            ..Default::default()
        };
        let result = SqliteLocalStore::open_with_retry(&config, &RetryConfig::test()).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_put_get_round_trip_with_synthesized_id() {
        let dir = tempdir().unwrap();
        let store = SqliteLocalStore::open_path(dir.path().join("relief.sqlite")).await.unwrap();

        let original = record(json!({"location": "LA", "people": 4, "pets": ["dog"]}));
        let id = store.put_record(RecordKind::Request, &original).await.unwrap();
        assert!(id.starts_with("local_"));

        let stored = store.get_record(RecordKind::Request, &id).await.unwrap().unwrap();
        let mut expected = original.clone();
        expected.id = Some(id);
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let store = SqliteLocalStore::open_path(dir.path().join("relief.sqlite")).await.unwrap();
        assert!(store.get_record(RecordKind::Pledge, "ghost").await.unwrap().is_none());
        store.delete_record(RecordKind::Pledge, "ghost").await.unwrap();
    }

    #[tokio::test]
    async fn test_messages_by_conversation_index() {
        let dir = tempdir().unwrap();
        let store = SqliteLocalStore::open_path(dir.path().join("relief.sqlite")).await.unwrap();

        store.put_record(RecordKind::Message, &record(json!({"id": "m1", "conversationId": "c1", "text": "hi"}))).await.unwrap();
        store.put_record(RecordKind::Message, &record(json!({"id": "m2", "conversationId": "c2", "text": "yo"}))).await.unwrap();
        store.put_record(RecordKind::Message, &record(json!({"id": "m3", "conversationId": "c1", "text": "ok"}))).await.unwrap();

        let hits = store
            .records_by_index(RecordKind::Message, RecordIndex::ConversationId, "c1")
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|r| r.str_field("conversationId") == Some("c1")));
    }

    #[tokio::test]
    async fn test_queue_update_and_filters() {
        let dir = tempdir().unwrap();
        let store = SqliteLocalStore::open_path(dir.path().join("relief.sqlite")).await.unwrap();

        let mut first = store.enqueue(OperationKind::Pledge, &record(json!({"id": "local_1_aaaaaaaaa"}))).await.unwrap();
        let second = store.enqueue(OperationKind::User, &record(json!({"id": "u1", "name": "Ana"}))).await.unwrap();
        assert!(second.id > first.id);

        first.record_failure("timeout", 5);
        store.update_operation(&first).await.unwrap();

        let queue = store.pending_operations().await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].id, first.id);
        assert_eq!(queue[0].attempts, 1);
        assert_eq!(queue[0].last_error.as_deref(), Some("timeout"));
        assert_eq!(queue[1].data.str_field("name"), Some("Ana"));

        let users = store.operations_by_type(OperationKind::User).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, second.id);

        let recent = store.operations_since(first.timestamp).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(store.operations_since(second.timestamp + 60_000).await.unwrap().is_empty());

        store.delete_operation(first.id).await.unwrap();
        assert_eq!(store.count_operations().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_all_tables() {
        let dir = tempdir().unwrap();
        let store = SqliteLocalStore::open_path(dir.path().join("relief.sqlite")).await.unwrap();

        for kind in RecordKind::ALL {
            store.put_record(kind, &record(json!({"name": "x"}))).await.unwrap();
        }
        store.enqueue(OperationKind::Request, &record(json!({"id": "r"}))).await.unwrap();

        store.clear_all().await.unwrap();
        for kind in RecordKind::ALL {
            assert!(store.all_records(kind).await.unwrap().is_empty());
        }
        assert_eq!(store.count_operations().await.unwrap(), 0);
    }
}
