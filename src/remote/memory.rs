use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use crate::record::now_millis;
use super::traits::{AuthProvider, DocumentWrite, RemoteError, RemoteStore};

/// Start or end of one write, in the order the remote saw them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEvent {
    Started,
    Finished,
}

/// In-process document store.
///
/// Stands in for the hosted backend in demos and tests. Writes can be made to
/// fail and given artificial latency; the number of writes in flight and the
/// start/finish order of every write are tracked so callers can observe
/// fan-out.
pub struct InMemoryRemote {
    docs: DashMap<(String, String), Map<String, Value>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    latency: RwLock<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    writes: AtomicUsize,
    write_log: Mutex<Vec<WriteEvent>>,
}

impl InMemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            latency: RwLock::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            write_log: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Successful writes so far
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    /// Highest number of writes observed in flight at once
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }

    /// Every write start and finish so far, failed writes included
    #[must_use]
    pub fn write_log(&self) -> Vec<WriteEvent> {
        self.write_log.lock().clone()
    }

    #[must_use]
    pub fn get(&self, collection: &str, id: &str) -> Option<Map<String, Value>> {
        self.docs
            .get(&(collection.to_string(), id.to_string()))
            .map(|d| d.value().clone())
    }

    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<(String, Map<String, Value>)> {
        self.docs
            .iter()
            .filter(|e| e.key().0 == collection)
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect()
    }

    /// Seed a document directly, bypassing failure injection.
    pub fn insert(&self, collection: &str, id: &str, fields: Map<String, Value>) {
        self.docs.insert((collection.to_string(), id.to_string()), fields);
    }

    fn resolve(write: DocumentWrite) -> Map<String, Value> {
        let mut fields = write.fields;
        let now = now_millis();
        for name in write.server_timestamps {
            fields.insert(name, Value::from(now));
        }
        fields
    }

    fn check_read(&self) -> Result<(), RemoteError> {
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(RemoteError::ReadFailed("backend unavailable".to_string()));
        }
        Ok(())
    }

    /// Simulate the network round trip for one write.
    async fn begin_write(&self) -> Result<InFlight<'_>, RemoteError> {
        let current = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(current, Ordering::AcqRel);
        self.write_log.lock().push(WriteEvent::Started);
        let guard = InFlight { count: &self.in_flight, log: &self.write_log };

        let latency = *self.latency.read();
        if latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }

        if self.fail_writes.load(Ordering::Acquire) {
            return Err(RemoteError::WriteFailed("backend unavailable".to_string()));
        }
        Ok(guard)
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a> {
    count: &'a AtomicUsize,
    log: &'a Mutex<Vec<WriteEvent>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
        self.log.lock().push(WriteEvent::Finished);
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn add_document(&self, collection: &str, write: DocumentWrite) -> Result<String, RemoteError> {
        let _guard = self.begin_write().await?;
        let id = uuid::Uuid::new_v4().simple().to_string()[..20].to_string();
        self.docs.insert((collection.to_string(), id.clone()), Self::resolve(write));
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(id)
    }

    async fn update_document(&self, collection: &str, id: &str, write: DocumentWrite) -> Result<(), RemoteError> {
        let _guard = self.begin_write().await?;
        let key = (collection.to_string(), id.to_string());
        let mut doc = self
            .docs
            .get_mut(&key)
            .ok_or_else(|| RemoteError::WriteFailed(format!("no document {}/{}", collection, id)))?;
        doc.extend(Self::resolve(write));
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn merge_document(&self, collection: &str, id: &str, write: DocumentWrite) -> Result<(), RemoteError> {
        let _guard = self.begin_write().await?;
        self.docs
            .entry((collection.to_string(), id.to_string()))
            .or_default()
            .extend(Self::resolve(write));
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Map<String, Value>>, RemoteError> {
        self.check_read()?;
        Ok(self.get(collection, id))
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<(String, Map<String, Value>)>, RemoteError> {
        self.check_read()?;
        Ok(self.documents(collection))
    }
}

/// Fixed auth context with a switchable user.
pub struct StaticAuth {
    user: RwLock<Option<String>>,
}

impl StaticAuth {
    #[must_use]
    pub fn signed_in(uid: impl Into<String>) -> Self {
        Self { user: RwLock::new(Some(uid.into())) }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { user: RwLock::new(None) }
    }

    pub fn set_user(&self, uid: Option<String>) {
        *self.user.write() = uid;
    }
}

impl AuthProvider for StaticAuth {
    fn current_user_id(&self) -> Option<String> {
        self.user.read().clone()
    }
}
