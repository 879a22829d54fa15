//! Downstream notification
//!
//! Messages go through an outbound queue first and are drained to the event
//! publisher after each successful job. A message whose publish fails stays
//! leased and is delivered again once its lease expires.

use crate::error::Result;
use crate::fetcher::SourceMetadata;
use cwscan_storage::{ArtifactRef, EventPublisher, JobQueue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Message announcing a parsed contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishMessage {
    #[serde(rename = "sourceID")]
    pub source_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    pub schemas: Vec<ArtifactRef>,

    #[serde(rename = "crateName", default, skip_serializing_if = "Option::is_none")]
    pub crate_name: Option<String>,

    #[serde(rename = "codeID", default, skip_serializing_if = "Option::is_none")]
    pub code_id: Option<serde_json::Value>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PublishMessage {
    pub fn new(source_id: &str, metadata: &SourceMetadata, schemas: Vec<ArtifactRef>) -> Self {
        Self {
            source_id: source_id.to_string(),
            address: metadata.address.clone(),
            schemas,
            crate_name: metadata.crate_name.clone(),
            code_id: metadata.code_id.clone(),
            extra: metadata.extra.clone(),
        }
    }
}

/// Outcome of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Publisher {
    queue: Arc<dyn JobQueue>,
    events: Arc<dyn EventPublisher>,
    topic: String,
}

impl Publisher {
    pub fn new(queue: Arc<dyn JobQueue>, events: Arc<dyn EventPublisher>, topic: impl Into<String>) -> Self {
        Self {
            queue,
            events,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Add a message to the outbound queue, returns the queue item id
    pub async fn enqueue_publish(&self, message: &PublishMessage) -> Result<String> {
        let payload = serde_json::to_string(message)?;
        Ok(self.queue.add(&payload).await?)
    }

    /// Publish what is currently visible in the outbound queue
    ///
    /// Bounded by the depth observed on entry, so failures are not retried
    /// within the same drain.
    pub async fn publish_pending(&self) -> Result<PublishReport> {
        let pending = self.queue.size().await?;
        let mut report = PublishReport::default();

        for _ in 0..pending {
            let Some(item) = self.queue.get().await? else {
                break;
            };

            match self.events.publish(&self.topic, item.payload.as_bytes()).await {
                Ok(message_id) => {
                    info!("Message {} published to {}", message_id, self.topic);
                    report.published += 1;
                    if let Err(e) = self.queue.ack(&item.ack).await {
                        warn!("Failed to acknowledge published item {}: {}", item.id, e);
                    }
                }
                Err(e) => {
                    error!("Received error while publishing {}: {}", item.id, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwscan_storage::{InMemoryEventPublisher, InMemoryQueue};
    use std::time::Duration;

    fn message() -> PublishMessage {
        let metadata = SourceMetadata::from_value(serde_json::json!({
            "address": "juno1abc",
            "codeID": 7,
            "network": "uni-6"
        }))
        .unwrap();
        PublishMessage::new(
            "src-1",
            &metadata,
            vec![ArtifactRef {
                id: "blob-1".to_string(),
                func_name: "execute".to_string(),
            }],
        )
    }

    #[test]
    fn test_message_shape() {
        let json = serde_json::to_value(message()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sourceID": "src-1",
                "address": "juno1abc",
                "schemas": [{"id": "blob-1", "funcName": "execute"}],
                "codeID": 7,
                "network": "uni-6"
            })
        );
    }

    #[tokio::test]
    async fn test_drain_publishes_and_acks() {
        let queue = InMemoryQueue::new(Duration::from_secs(60));
        let events = InMemoryEventPublisher::new();
        let publisher = Publisher::new(Arc::new(queue.clone()), Arc::new(events.clone()), "contracts");

        publisher.enqueue_publish(&message()).await.unwrap();
        publisher.enqueue_publish(&message()).await.unwrap();

        let report = publisher.publish_pending().await.unwrap();
        assert_eq!(report, PublishReport { published: 2, failed: 0 });

        let published = events.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].topic, "contracts");
        let decoded: PublishMessage = serde_json::from_slice(&published[0].data).unwrap();
        assert_eq!(decoded, message());
        assert_eq!(queue.size().await.unwrap(), 0);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_publish_stays_leased() {
        let queue = InMemoryQueue::new(Duration::from_secs(60));
        let events = InMemoryEventPublisher::new();
        let publisher = Publisher::new(Arc::new(queue.clone()), Arc::new(events.clone()), "contracts");

        publisher.enqueue_publish(&message()).await.unwrap();
        events.set_failing(true);

        let report = publisher.publish_pending().await.unwrap();
        assert_eq!(report, PublishReport { published: 0, failed: 1 });
        assert_eq!(queue.in_flight(), 1);
        assert!(events.published().is_empty());
    }

    #[tokio::test]
    async fn test_redelivered_after_lease_expiry() {
        let queue = InMemoryQueue::new(Duration::from_millis(50));
        let events = InMemoryEventPublisher::new();
        let publisher = Publisher::new(Arc::new(queue.clone()), Arc::new(events.clone()), "contracts");

        publisher.enqueue_publish(&message()).await.unwrap();
        events.set_failing(true);
        publisher.publish_pending().await.unwrap();

        events.set_failing(false);
        tokio::time::sleep(Duration::from_millis(120)).await;
        let report = publisher.publish_pending().await.unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(events.published().len(), 1);
    }
}
