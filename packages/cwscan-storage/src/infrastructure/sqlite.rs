//! SQLite adapters
//!
//! One database file hosts every queue, bucket, the job records and the event
//! log. Each handle shares the backend's connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    ArtifactRef, BlobInfo, BlobStore, EventPublisher, JobQueue, JobRecord, JobRecordUpdate,
    QueueItem, ResultStore,
};
use crate::infrastructure::memory::{lease_deadline, new_id};
use crate::{Result, StorageError};

/// Wait for a competing writer instead of failing with `SQLITE_BUSY`
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

/// Shared SQLite connection
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) the database at the given path
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let backend = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        backend.init_schema()?;
        Ok(backend)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS queue_items (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                queue TEXT NOT NULL,
                payload TEXT NOT NULL,
                visible INTEGER NOT NULL,
                ack TEXT,
                tries INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                deleted_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_queue_visible
                ON queue_items(queue, deleted_at, visible);
            CREATE INDEX IF NOT EXISTS idx_queue_ack
                ON queue_items(ack);

            CREATE TABLE IF NOT EXISTS blobs (
                id TEXT PRIMARY KEY,
                bucket TEXT NOT NULL,
                filename TEXT NOT NULL,
                length INTEGER NOT NULL,
                metadata TEXT NOT NULL,
                uploaded_at INTEGER NOT NULL,
                data BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS job_records (
                source_id TEXT PRIMARY KEY,
                schemas TEXT,
                parsed INTEGER,
                error TEXT,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                data BLOB NOT NULL,
                published_at INTEGER NOT NULL
            );",
        )?;

        Ok(())
    }

    /// Queue handle
    pub fn queue(&self, name: impl Into<String>, visibility: Duration) -> SqliteQueue {
        SqliteQueue {
            conn: Arc::clone(&self.conn),
            name: name.into(),
            visibility,
        }
    }

    /// Bucket handle
    pub fn bucket(&self, name: impl Into<String>) -> SqliteBucket {
        SqliteBucket {
            conn: Arc::clone(&self.conn),
            name: name.into(),
        }
    }

    pub fn results(&self) -> SqliteResultStore {
        SqliteResultStore {
            conn: Arc::clone(&self.conn),
        }
    }

    pub fn event_log(&self) -> SqliteEventLog {
        SqliteEventLog {
            conn: Arc::clone(&self.conn),
        }
    }
}

/// Named queue in `queue_items`
#[derive(Clone)]
pub struct SqliteQueue {
    conn: Arc<Mutex<Connection>>,
    name: String,
    visibility: Duration,
}

#[async_trait]
impl JobQueue for SqliteQueue {
    async fn add(&self, payload: &str) -> Result<String> {
        let id = new_id();
        let now = millis(Utc::now());
        self.conn.lock().execute(
            "INSERT INTO queue_items (id, queue, payload, visible, tries, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?4)",
            params![id, self.name, payload, now],
        )?;
        Ok(id)
    }

    async fn size(&self) -> Result<u64> {
        let now = millis(Utc::now());
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM queue_items
             WHERE queue = ?1 AND deleted_at IS NULL AND visible <= ?2",
            params![self.name, now],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn get(&self) -> Result<Option<QueueItem>> {
        let now = Utc::now();
        let mut conn = self.conn.lock();
        // IMMEDIATE takes the write lock up front, so two processes cannot
        // select the same visible row
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row = tx
            .query_row(
                "SELECT id, payload, tries FROM queue_items
                 WHERE queue = ?1 AND deleted_at IS NULL AND visible <= ?2
                 ORDER BY seq LIMIT 1",
                params![self.name, millis(now)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, payload, tries)) = row else {
            tx.commit()?;
            return Ok(None);
        };

        let ack = new_id();
        tx.execute(
            "UPDATE queue_items SET visible = ?1, ack = ?2, tries = tries + 1 WHERE id = ?3",
            params![millis(lease_deadline(now, self.visibility)), ack, id],
        )?;
        tx.commit()?;

        Ok(Some(QueueItem {
            id,
            ack,
            payload,
            tries: (tries + 1) as u32,
        }))
    }

    async fn ack(&self, ack: &str) -> Result<()> {
        let now = millis(Utc::now());
        let changed = self.conn.lock().execute(
            "UPDATE queue_items SET deleted_at = ?1
             WHERE queue = ?2 AND ack = ?3 AND deleted_at IS NULL AND visible > ?1",
            params![now, self.name, ack],
        )?;
        if changed == 0 {
            return Err(StorageError::lease_expired(ack));
        }
        Ok(())
    }
}

/// Named bucket in `blobs`
#[derive(Clone)]
pub struct SqliteBucket {
    conn: Arc<Mutex<Connection>>,
    name: String,
}

#[async_trait]
impl BlobStore for SqliteBucket {
    async fn find(&self, id: &str) -> Result<Option<BlobInfo>> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT filename, length, metadata, uploaded_at FROM blobs
                 WHERE bucket = ?1 AND id = ?2",
                params![self.name, id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((filename, length, metadata, uploaded_at)) = row else {
            return Ok(None);
        };
        Ok(Some(BlobInfo {
            id: id.to_string(),
            filename,
            length: length as u64,
            metadata: serde_json::from_str(&metadata)?,
            uploaded_at: from_millis(uploaded_at),
        }))
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        self.conn
            .lock()
            .query_row(
                "SELECT data FROM blobs WHERE bucket = ?1 AND id = ?2",
                params![self.name, id],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::blob_not_found(id))
    }

    async fn upload(
        &self,
        filename: &str,
        data: &[u8],
        metadata: serde_json::Value,
    ) -> Result<String> {
        let id = new_id();
        self.conn.lock().execute(
            "INSERT INTO blobs (id, bucket, filename, length, metadata, uploaded_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                self.name,
                filename,
                data.len() as i64,
                serde_json::to_string(&metadata)?,
                millis(Utc::now()),
                data
            ],
        )?;
        Ok(id)
    }
}

/// Job records table
#[derive(Clone)]
pub struct SqliteResultStore {
    conn: Arc<Mutex<Connection>>,
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn update_job_record(&self, source_id: &str, update: &JobRecordUpdate) -> Result<()> {
        let schemas = update
            .schemas
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.lock().execute(
            "INSERT INTO job_records (source_id, schemas, parsed, error, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_id) DO UPDATE SET
                schemas = COALESCE(excluded.schemas, schemas),
                parsed = COALESCE(excluded.parsed, parsed),
                error = COALESCE(excluded.error, error),
                updated_at = excluded.updated_at",
            params![
                source_id,
                schemas,
                update.parsed,
                update.error,
                millis(Utc::now())
            ],
        )?;
        Ok(())
    }

    async fn get_job_record(&self, source_id: &str) -> Result<Option<JobRecord>> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT schemas, parsed, error FROM job_records WHERE source_id = ?1",
                params![source_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<bool>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((schemas, parsed, error)) = row else {
            return Ok(None);
        };
        let schemas = schemas
            .map(|json| serde_json::from_str::<Vec<ArtifactRef>>(&json))
            .transpose()?;

        Ok(Some(JobRecord {
            source_id: source_id.to_string(),
            schemas,
            parsed,
            error,
        }))
    }
}

/// Event log table standing in for the downstream topic
#[derive(Clone)]
pub struct SqliteEventLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventLog {
    /// Messages published to `topic`, oldest first
    pub fn messages(&self, topic: &str) -> Result<Vec<Vec<u8>>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT data FROM events WHERE topic = ?1 ORDER BY published_at, rowid",
        )?;
        let rows = stmt.query_map(params![topic], |row| row.get::<_, Vec<u8>>(0))?;
        let messages = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}

#[async_trait]
impl EventPublisher for SqliteEventLog {
    async fn publish(&self, topic: &str, data: &[u8]) -> Result<String> {
        let id = new_id();
        self.conn.lock().execute(
            "INSERT INTO events (id, topic, data, published_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, topic, data, millis(Utc::now())],
        )?;
        Ok(id)
    }
}
