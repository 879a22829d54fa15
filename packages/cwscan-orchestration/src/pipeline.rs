use crate::error::Result;
use crate::fetcher::{ScratchDir, SourceMetadata};
use crate::generator::SchemaArtifact;
use crate::job::{JobStage, JobStateMachine};
use async_trait::async_trait;
use cwscan_ir::MessageTypeBinding;
use cwscan_storage::ArtifactRef;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Per-job state threaded through the stages
pub struct JobContext {
    pub source_id: String,
    /// Removed when the context is dropped
    pub scratch: ScratchDir,
    pub metadata: SourceMetadata,
    /// Extracted bundle root, or the nested crate inside it
    pub project_root: PathBuf,
    pub crate_name: String,
    pub bindings: Vec<MessageTypeBinding>,
    pub artifacts: Vec<SchemaArtifact>,
    pub schemas: Vec<ArtifactRef>,
}

impl JobContext {
    pub fn new(source_id: impl Into<String>, scratch: ScratchDir) -> Self {
        let project_root = scratch.path().to_path_buf();
        Self {
            source_id: source_id.into(),
            scratch,
            metadata: SourceMetadata::default(),
            project_root,
            crate_name: String::new(),
            bindings: Vec::new(),
            artifacts: Vec::new(),
            schemas: Vec::new(),
        }
    }
}

/// Stage handler trait (pluggable stages)
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Stage this handler implements
    fn stage(&self) -> JobStage;

    /// Execute stage
    async fn execute(&self, ctx: &mut JobContext) -> Result<()>;
}

/// Ordered stage handlers driven through the job state machine
#[derive(Clone, Default)]
pub struct Pipeline {
    handlers: Vec<Arc<dyn StageHandler>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage handler
    pub fn register_handler(&mut self, handler: Arc<dyn StageHandler>) {
        self.handlers.push(handler);
    }

    pub fn stages(&self) -> Vec<JobStage> {
        self.handlers.iter().map(|h| h.stage()).collect()
    }

    /// Run every handler in order, stopping at the first error
    ///
    /// The state machine is advanced before each handler, so on error it is
    /// left on the failing stage.
    pub async fn run(&self, sm: &mut JobStateMachine, ctx: &mut JobContext) -> Result<()> {
        for handler in &self.handlers {
            let stage = handler.stage();
            sm.advance(stage)?;

            let start = Instant::now();
            handler.execute(ctx).await?;
            debug!(
                "Job {}: stage {} finished in {}ms",
                sm.job().id,
                stage,
                start.elapsed().as_millis()
            );
        }
        Ok(())
    }
}
