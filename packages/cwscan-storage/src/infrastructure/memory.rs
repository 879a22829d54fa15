//! In-memory adapters (tests, `--in-memory` runs)
//!
//! Same lease semantics as the SQLite adapters, state lives behind
//! `parking_lot` locks and is lost on drop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    BlobInfo, BlobStore, EventPublisher, JobQueue, JobRecord, JobRecordUpdate, QueueItem,
    ResultStore,
};
use crate::{Result, StorageError};

pub(crate) fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub(crate) fn lease_deadline(now: DateTime<Utc>, visibility: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(visibility)
        .ok()
        .and_then(|window| now.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone)]
struct QueueEntry {
    id: String,
    payload: String,
    visible: DateTime<Utc>,
    ack: Option<String>,
    tries: u32,
}

/// In-memory [`JobQueue`]
#[derive(Clone)]
pub struct InMemoryQueue {
    visibility: Duration,
    entries: Arc<Mutex<Vec<QueueEntry>>>,
}

impl InMemoryQueue {
    pub fn new(visibility: Duration) -> Self {
        Self {
            visibility,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Items leased and not yet acked
    pub fn in_flight(&self) -> usize {
        let now = Utc::now();
        self.entries
            .lock()
            .iter()
            .filter(|e| e.ack.is_some() && e.visible > now)
            .count()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn add(&self, payload: &str) -> Result<String> {
        let id = new_id();
        self.entries.lock().push(QueueEntry {
            id: id.clone(),
            payload: payload.to_string(),
            visible: Utc::now(),
            ack: None,
            tries: 0,
        });
        Ok(id)
    }

    async fn size(&self) -> Result<u64> {
        let now = Utc::now();
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|e| e.visible <= now)
            .count() as u64)
    }

    async fn get(&self) -> Result<Option<QueueItem>> {
        let now = Utc::now();
        let mut entries = self.entries.lock();

        let Some(entry) = entries.iter_mut().find(|e| e.visible <= now) else {
            return Ok(None);
        };

        let ack = new_id();
        entry.visible = lease_deadline(now, self.visibility);
        entry.ack = Some(ack.clone());
        entry.tries += 1;

        Ok(Some(QueueItem {
            id: entry.id.clone(),
            ack,
            payload: entry.payload.clone(),
            tries: entry.tries,
        }))
    }

    async fn ack(&self, ack: &str) -> Result<()> {
        let now = Utc::now();
        let mut entries = self.entries.lock();

        let index = entries
            .iter()
            .position(|e| e.ack.as_deref() == Some(ack) && e.visible > now)
            .ok_or_else(|| StorageError::lease_expired(ack))?;
        entries.remove(index);
        Ok(())
    }
}

/// In-memory [`BlobStore`]
#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, (BlobInfo, Vec<u8>)>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored files, oldest first
    pub fn list(&self) -> Vec<BlobInfo> {
        let mut infos: Vec<_> = self
            .blobs
            .read()
            .values()
            .map(|(info, _)| info.clone())
            .collect();
        infos.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then(a.id.cmp(&b.id)));
        infos
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn find(&self, id: &str) -> Result<Option<BlobInfo>> {
        Ok(self.blobs.read().get(id).map(|(info, _)| info.clone()))
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(id)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| StorageError::blob_not_found(id))
    }

    async fn upload(
        &self,
        filename: &str,
        data: &[u8],
        metadata: serde_json::Value,
    ) -> Result<String> {
        let info = BlobInfo {
            id: new_id(),
            filename: filename.to_string(),
            length: data.len() as u64,
            metadata,
            uploaded_at: Utc::now(),
        };
        let id = info.id.clone();
        self.blobs.write().insert(id.clone(), (info, data.to_vec()));
        Ok(id)
    }
}

/// In-memory [`ResultStore`]
#[derive(Clone, Default)]
pub struct InMemoryResultStore {
    records: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn update_job_record(&self, source_id: &str, update: &JobRecordUpdate) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .entry(source_id.to_string())
            .or_insert_with(|| JobRecord {
                source_id: source_id.to_string(),
                ..JobRecord::default()
            });
        update.apply_to(record);
        Ok(())
    }

    async fn get_job_record(&self, source_id: &str) -> Result<Option<JobRecord>> {
        Ok(self.records.read().get(source_id).cloned())
    }
}

/// Event captured by [`InMemoryEventPublisher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub id: String,
    pub topic: String,
    pub data: Vec<u8>,
}

/// In-memory [`EventPublisher`] that records every message
#[derive(Clone, Default)]
pub struct InMemoryEventPublisher {
    events: Arc<Mutex<Vec<PublishedEvent>>>,
    failing: Arc<Mutex<bool>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<PublishedEvent> {
        self.events.lock().clone()
    }

    /// Reject every publish until reset
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, topic: &str, data: &[u8]) -> Result<String> {
        if *self.failing.lock() {
            return Err(StorageError::publish(format!(
                "topic {} rejected the message",
                topic
            )));
        }
        let event = PublishedEvent {
            id: new_id(),
            topic: topic.to_string(),
            data: data.to_vec(),
        };
        let id = event.id.clone();
        self.events.lock().push(event);
        Ok(id)
    }
}
