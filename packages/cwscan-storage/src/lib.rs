//! cwscan storage - queue, blob, result and event ports
//!
//! ## Core Principles
//!
//! 1. **Lease protocol**: a leased queue item is invisible to other consumers
//!    until its visibility window ends; `ack` only succeeds inside the window
//! 2. **Upsert records**: job record updates only change the fields supplied
//! 3. **Ports first**: the worker depends on the traits in [`domain`], adapters
//!    live in [`infrastructure`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cwscan_storage::{JobQueue, InMemoryQueue};
//!
//! let queue = InMemoryQueue::new(Duration::from_secs(900));
//! queue.add("source-id").await?;
//!
//! if let Some(item) = queue.get().await? {
//!     // ... process item.payload ...
//!     queue.ack(&item.ack).await?;
//! }
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{
    ArtifactRef, BlobInfo, BlobStore, EventPublisher, JobQueue, JobRecord, JobRecordUpdate,
    QueueItem, ResultStore,
};
pub use infrastructure::{
    InMemoryBlobStore, InMemoryEventPublisher, InMemoryQueue, InMemoryResultStore, PublishedEvent,
};

#[cfg(feature = "sqlite")]
pub use infrastructure::{SqliteBackend, SqliteBucket, SqliteEventLog, SqliteQueue, SqliteResultStore};
