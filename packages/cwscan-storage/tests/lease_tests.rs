//! Lease protocol tests
//!
//! An unexpired, unacknowledged lease is never handed to a second consumer,
//! whether the consumers share a process or only a database file.

use cwscan_storage::{InMemoryQueue, JobQueue, SqliteBackend};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const VISIBILITY: Duration = Duration::from_secs(900);

async fn drain(queue: &dyn JobQueue) -> Vec<String> {
    let mut leased = Vec::new();
    while let Some(item) = queue.get().await.unwrap() {
        leased.push(item.id);
    }
    leased
}

#[tokio::test]
async fn test_memory_queue_concurrent_consumers_never_share_items() {
    let queue = Arc::new(InMemoryQueue::new(VISIBILITY));
    for i in 0..50 {
        queue.add(&format!("source-{}", i)).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move { drain(queue.as_ref()).await }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.await.unwrap() {
            total += 1;
            seen.insert(id);
        }
    }
    assert_eq!(total, 50);
    assert_eq!(seen.len(), 50);
}

#[tokio::test]
async fn test_sqlite_backends_on_one_file_never_share_items() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("worker.db");

    let first = SqliteBackend::open(&db_path).unwrap();
    let second = SqliteBackend::open(&db_path).unwrap();
    let producer = first.queue("parsing-queue", VISIBILITY);
    for i in 0..20 {
        producer.add(&format!("source-{}", i)).await.unwrap();
    }

    let a = first.queue("parsing-queue", VISIBILITY);
    let b = second.queue("parsing-queue", VISIBILITY);

    let mut seen = HashSet::new();
    loop {
        let mut progressed = false;
        for queue in [&a, &b] {
            if let Some(item) = queue.get().await.unwrap() {
                assert!(seen.insert(item.id), "item leased twice");
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    assert_eq!(seen.len(), 20);
    assert_eq!(b.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sqlite_ack_from_other_process_removes_item() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("worker.db");

    let first = SqliteBackend::open(&db_path).unwrap().queue("q", VISIBILITY);
    let second = SqliteBackend::open(&db_path).unwrap().queue("q", VISIBILITY);

    first.add("source-1").await.unwrap();
    let item = first.get().await.unwrap().unwrap();

    assert!(second.get().await.unwrap().is_none());
    second.ack(&item.ack).await.unwrap();
    assert!(first.ack(&item.ack).await.is_err());
}
