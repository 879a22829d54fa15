//! Domain layer for the worker's external collaborators
//!
//! # Domain Models
//!
//! - `QueueItem`: a leased work item
//! - `BlobInfo`: stored file metadata
//! - `ArtifactRef`, `JobRecord`, `JobRecordUpdate`: parsing outcome per source
//!
//! # Port Traits
//!
//! - `JobQueue`: durable queue with a lease/visibility protocol
//! - `BlobStore`: bucket of files addressed by id
//! - `ResultStore`: job record persistence with `$set` semantics
//! - `EventPublisher`: downstream event bus

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

// ═══════════════════════════════════════════════════════════════════════════
// Domain Models
// ═══════════════════════════════════════════════════════════════════════════

/// Work item returned by a lease
///
/// `ack` is the lease token. It changes on every lease, so an ack issued for
/// an earlier delivery no longer matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub ack: String,
    pub payload: String,
    /// Delivery count, including this one
    pub tries: u32,
}

/// Stored file metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobInfo {
    pub id: String,
    pub filename: String,
    pub length: u64,
    /// Free-form metadata supplied at upload
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub uploaded_at: DateTime<Utc>,
}

/// Uploaded artifact and the entry function it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: String,
    #[serde(rename = "funcName")]
    pub func_name: String,
}

/// Parsing outcome of one source bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(rename = "_id")]
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemas: Option<Vec<ArtifactRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Partial update of a [`JobRecord`]; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRecordUpdate {
    pub schemas: Option<Vec<ArtifactRef>>,
    pub parsed: Option<bool>,
    pub error: Option<String>,
}

impl JobRecordUpdate {
    /// Successful parse with its uploaded artifacts
    pub fn parsed(schemas: Vec<ArtifactRef>) -> Self {
        Self {
            schemas: Some(schemas),
            parsed: Some(true),
            error: None,
        }
    }

    /// Failed parse
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Apply the set fields to `record`
    pub fn apply_to(&self, record: &mut JobRecord) {
        if let Some(schemas) = &self.schemas {
            record.schemas = Some(schemas.clone());
        }
        if let Some(parsed) = self.parsed {
            record.parsed = Some(parsed);
        }
        if let Some(error) = &self.error {
            record.error = Some(error.clone());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Traits
// ═══════════════════════════════════════════════════════════════════════════

/// Durable work queue with leases
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a payload, returns the item id
    async fn add(&self, payload: &str) -> Result<String>;

    /// Number of items currently visible (not leased, not acked)
    async fn size(&self) -> Result<u64>;

    /// Lease the oldest visible item for the visibility window
    async fn get(&self) -> Result<Option<QueueItem>>;

    /// Remove a leased item. Fails once the lease has expired.
    async fn ack(&self, ack: &str) -> Result<()>;
}

/// Bucket of files
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<BlobInfo>>;

    /// Complete file content, `NotFound` when absent
    async fn download(&self, id: &str) -> Result<Vec<u8>>;

    /// Store a file, returns its id
    async fn upload(&self, filename: &str, data: &[u8], metadata: serde_json::Value)
        -> Result<String>;
}

/// Job record persistence
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Upsert: creates the record if needed, then sets the supplied fields
    async fn update_job_record(&self, source_id: &str, update: &JobRecordUpdate) -> Result<()>;

    async fn get_job_record(&self, source_id: &str) -> Result<Option<JobRecord>>;
}

/// Downstream event bus
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one message, returns the transport's message id
    async fn publish(&self, topic: &str, data: &[u8]) -> Result<String>;
}
