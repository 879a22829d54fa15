use crate::artifacts::store_artifacts;
use crate::error::Result;
use crate::job::JobStage;
use crate::pipeline::{JobContext, StageHandler};
use crate::publisher::{PublishMessage, Publisher};
use async_trait::async_trait;
use cwscan_storage::{BlobStore, JobRecordUpdate, ResultStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Upload artifacts, record the result and notify downstream
pub struct PersistStage {
    schemas: Arc<dyn BlobStore>,
    results: Arc<dyn ResultStore>,
    publisher: Publisher,
}

impl PersistStage {
    pub fn new(
        schemas: Arc<dyn BlobStore>,
        results: Arc<dyn ResultStore>,
        publisher: Publisher,
    ) -> Self {
        Self {
            schemas,
            results,
            publisher,
        }
    }
}

#[async_trait]
impl StageHandler for PersistStage {
    fn stage(&self) -> JobStage {
        JobStage::Persisting
    }

    async fn execute(&self, ctx: &mut JobContext) -> Result<()> {
        ctx.schemas = store_artifacts(
            self.schemas.as_ref(),
            &ctx.artifacts,
            &ctx.bindings,
            &ctx.source_id,
            ctx.metadata.address.as_deref(),
        )
        .await?;

        self.results
            .update_job_record(&ctx.source_id, &JobRecordUpdate::parsed(ctx.schemas.clone()))
            .await?;

        let message = PublishMessage::new(&ctx.source_id, &ctx.metadata, ctx.schemas.clone());
        self.publisher.enqueue_publish(&message).await?;

        // The record is already written, a failed drain only delays delivery
        match self.publisher.publish_pending().await {
            Ok(report) if report.failed > 0 => warn!(
                "{} of {} pending messages failed to publish",
                report.failed,
                report.failed + report.published
            ),
            Ok(report) => info!("Published {} pending messages", report.published),
            Err(e) => warn!("Failed to drain publish queue: {}", e),
        }
        Ok(())
    }
}
