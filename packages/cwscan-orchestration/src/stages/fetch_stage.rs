use crate::config::WorkerConfig;
use crate::error::Result;
use crate::fetcher::{fetch_source, resolve_crate_root};
use crate::job::JobStage;
use crate::pipeline::{JobContext, StageHandler};
use async_trait::async_trait;
use cwscan_storage::BlobStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Download and extract the source bundle, then locate the crate to analyze
pub struct FetchStage {
    sources: Arc<dyn BlobStore>,
    locator: Vec<String>,
    locator_timeout: Duration,
}

impl FetchStage {
    pub fn new(sources: Arc<dyn BlobStore>, config: &WorkerConfig) -> Self {
        Self {
            sources,
            locator: config.generator.package_locator.clone(),
            locator_timeout: config.locator_timeout(),
        }
    }
}

#[async_trait]
impl StageHandler for FetchStage {
    fn stage(&self) -> JobStage {
        JobStage::Fetching
    }

    async fn execute(&self, ctx: &mut JobContext) -> Result<()> {
        ctx.metadata = fetch_source(self.sources.as_ref(), &ctx.source_id, &ctx.scratch).await?;
        ctx.project_root = ctx.scratch.path().to_path_buf();

        if let Some(crate_name) = ctx.metadata.crate_name.as_deref() {
            ctx.project_root = resolve_crate_root(
                &ctx.project_root,
                crate_name,
                &self.locator,
                self.locator_timeout,
            )
            .await?;
            info!(
                "Source {}: analyzing nested crate {} at {}",
                ctx.source_id,
                crate_name,
                ctx.project_root.display()
            );
        }
        Ok(())
    }
}
