use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use crate::record::{now_millis, OperationKind, OperationStatus, PendingOperation, Record, RecordKind};
use super::traits::{LocalStore, RecordIndex, StorageError, Table};

/// Non-durable local store. Used when SQLite cannot be opened and in tests.
pub struct InMemoryLocalStore {
    tables: HashMap<RecordKind, DashMap<String, Record>>,
    queue: Mutex<BTreeMap<i64, PendingOperation>>,
    next_op_id: AtomicI64,
}

impl InMemoryLocalStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RecordKind::ALL.iter().map(|k| (*k, DashMap::new())).collect(),
            queue: Mutex::new(BTreeMap::new()),
            next_op_id: AtomicI64::new(1),
        }
    }

    /// Number of records in one table
    #[must_use]
    pub fn len(&self, kind: RecordKind) -> usize {
        self.table(kind).len()
    }

    fn table(&self, kind: RecordKind) -> &DashMap<String, Record> {
        // Every kind is inserted in `new`
        &self.tables[&kind]
    }

    fn filter_queue(&self, pred: impl Fn(&PendingOperation) -> bool) -> Vec<PendingOperation> {
        self.queue.lock().values().filter(|op| pred(op)).cloned().collect()
    }
}

impl Default for InMemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn put_record(&self, kind: RecordKind, record: &Record) -> Result<String, StorageError> {
        let mut record = record.clone();
        let id = record.ensure_id().to_string();
        self.table(kind).insert(id.clone(), record);
        Ok(id)
    }

    async fn get_record(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StorageError> {
        Ok(self.table(kind).get(id).map(|r| r.value().clone()))
    }

    async fn all_records(&self, kind: RecordKind) -> Result<Vec<Record>, StorageError> {
        Ok(self.table(kind).iter().map(|r| r.value().clone()).collect())
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
        Ok(self
            .table(kind)
            .iter()
            .filter(|r| r.value().str_field(index.name()) == Some(value))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn delete_record(&self, kind: RecordKind, id: &str) -> Result<(), StorageError> {
        self.table(kind).remove(id);
        Ok(())
    }

    async fn enqueue(&self, kind: OperationKind, data: &Record) -> Result<PendingOperation, StorageError> {
        let op = PendingOperation {
            id: self.next_op_id.fetch_add(1, Ordering::AcqRel),
            kind,
            data: data.clone(),
            timestamp: now_millis(),
            attempts: 0,
            status: OperationStatus::Active,
            last_error: None,
        };
        self.queue.lock().insert(op.id, op.clone());
        Ok(op)
    }

    async fn pending_operations(&self) -> Result<Vec<PendingOperation>, StorageError> {
        Ok(self.filter_queue(|_| true))
    }

    async fn operations_by_type(&self, kind: OperationKind) -> Result<Vec<PendingOperation>, StorageError> {
        Ok(self.filter_queue(|op| op.kind == kind))
    }

    async fn operations_since(&self, timestamp: i64) -> Result<Vec<PendingOperation>, StorageError> {
        Ok(self.filter_queue(|op| op.timestamp >= timestamp))
    }

    async fn update_operation(&self, op: &PendingOperation) -> Result<(), StorageError> {
        self.queue.lock().insert(op.id, op.clone());
        Ok(())
    }

    async fn delete_operation(&self, id: i64) -> Result<(), StorageError> {
        self.queue.lock().remove(&id);
        Ok(())
    }

    async fn count_operations(&self) -> Result<usize, StorageError> {
        Ok(self.queue.lock().len())
    }

    async fn clear(&self, table: Table) -> Result<(), StorageError> {
        match table {
            Table::Records(kind) => self.table(kind).clear(),
            Table::PendingUploads => self.queue.lock().clear(),
        }
        Ok(())
    }
}
