//! Connected collaborators of the worker
//!
//! Built by `init()` and dropped by `shutdown()`; nothing here is global.

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::publisher::Publisher;
use cwscan_ir::{ExternalProducer, SynProducer, SyntaxTreeProducer};
use cwscan_storage::{
    BlobStore, InMemoryBlobStore, InMemoryEventPublisher, InMemoryQueue, InMemoryResultStore,
    JobQueue, ResultStore, SqliteBackend,
};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct WorkerContext {
    /// Inbound parsing queue
    pub queue: Arc<dyn JobQueue>,
    pub sources: Arc<dyn BlobStore>,
    pub schemas: Arc<dyn BlobStore>,
    pub results: Arc<dyn ResultStore>,
    pub publisher: Publisher,
    pub producer: Arc<dyn SyntaxTreeProducer>,
}

impl WorkerContext {
    /// Open the SQLite database named by the configuration
    pub fn connect(config: &WorkerConfig) -> Result<Self> {
        let backend = SqliteBackend::open(&config.database_path)?;
        info!("Connected to database {}", config.database_path.display());

        Ok(Self {
            queue: Arc::new(backend.queue(&config.queue.name, config.visibility())),
            sources: Arc::new(backend.bucket(&config.buckets.sources)),
            schemas: Arc::new(backend.bucket(&config.buckets.schemas)),
            results: Arc::new(backend.results()),
            publisher: Publisher::new(
                Arc::new(backend.queue(&config.queue.publish_name, config.visibility())),
                Arc::new(backend.event_log()),
                &config.publish.topic_id,
            ),
            producer: build_producer(config),
        })
    }
}

/// Syntax tree producer selected by the configuration
pub fn build_producer(config: &WorkerConfig) -> Arc<dyn SyntaxTreeProducer> {
    match &config.syntax.external_bin {
        Some(bin) => Arc::new(ExternalProducer::from_bin(bin).with_timeout(config.syntax_timeout())),
        None => Arc::new(SynProducer::new()),
    }
}

/// Concrete in-memory adapters, kept reachable for inspection
#[derive(Clone)]
pub struct InMemoryBackend {
    pub queue: InMemoryQueue,
    pub publish_queue: InMemoryQueue,
    pub sources: InMemoryBlobStore,
    pub schemas: InMemoryBlobStore,
    pub results: InMemoryResultStore,
    pub events: InMemoryEventPublisher,
}

impl InMemoryBackend {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            queue: InMemoryQueue::new(config.visibility()),
            publish_queue: InMemoryQueue::new(config.visibility()),
            sources: InMemoryBlobStore::new(),
            schemas: InMemoryBlobStore::new(),
            results: InMemoryResultStore::new(),
            events: InMemoryEventPublisher::new(),
        }
    }

    pub fn context(&self, config: &WorkerConfig) -> WorkerContext {
        WorkerContext {
            queue: Arc::new(self.queue.clone()),
            sources: Arc::new(self.sources.clone()),
            schemas: Arc::new(self.schemas.clone()),
            results: Arc::new(self.results.clone()),
            publisher: Publisher::new(
                Arc::new(self.publish_queue.clone()),
                Arc::new(self.events.clone()),
                &config.publish.topic_id,
            ),
            producer: build_producer(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_shares_one_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            database_path: dir.path().join("worker.db"),
            ..WorkerConfig::default()
        };

        let first = WorkerContext::connect(&config).unwrap();
        first.queue.add("source-1").await.unwrap();

        let second = WorkerContext::connect(&config).unwrap();
        assert_eq!(second.queue.size().await.unwrap(), 1);
        assert_eq!(second.publisher.topic(), "contract-schemas");
    }

    #[test]
    fn test_producer_selection() {
        let mut config = WorkerConfig::default();
        assert_eq!(build_producer(&config).name(), SynProducer::new().name());

        config.syntax.external_bin = Some("/usr/local/bin/rust2json".to_string());
        assert_eq!(
            build_producer(&config).name(),
            ExternalProducer::from_bin("x").name()
        );
    }
}
