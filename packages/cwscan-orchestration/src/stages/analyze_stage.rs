use crate::error::{OrchestratorError, Result};
use crate::job::JobStage;
use crate::manifest::read_crate_name;
use crate::pipeline::{JobContext, StageHandler};
use async_trait::async_trait;
use cwscan_ir::{analyze_project, SyntaxTreeProducer};
use std::sync::Arc;

/// Resolve the entry point message types of the project
pub struct AnalyzeStage {
    producer: Arc<dyn SyntaxTreeProducer>,
}

impl AnalyzeStage {
    pub fn new(producer: Arc<dyn SyntaxTreeProducer>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl StageHandler for AnalyzeStage {
    fn stage(&self) -> JobStage {
        JobStage::Analyzing
    }

    async fn execute(&self, ctx: &mut JobContext) -> Result<()> {
        ctx.crate_name = read_crate_name(&ctx.project_root).await?;
        ctx.bindings =
            analyze_project(&ctx.project_root, &ctx.crate_name, self.producer.as_ref()).await?;

        if ctx.bindings.is_empty() {
            return Err(OrchestratorError::NoBindings(ctx.crate_name.clone()));
        }
        Ok(())
    }
}
