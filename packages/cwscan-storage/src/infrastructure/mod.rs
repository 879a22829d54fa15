//! Infrastructure layer - storage adapters
//!
//! - `memory`: in-process adapters for tests and `--in-memory` runs
//! - `sqlite`: single-node durable adapters

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{
    InMemoryBlobStore, InMemoryEventPublisher, InMemoryQueue, InMemoryResultStore, PublishedEvent,
};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackend, SqliteBucket, SqliteEventLog, SqliteQueue, SqliteResultStore};
