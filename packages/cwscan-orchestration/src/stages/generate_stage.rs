use crate::config::WorkerConfig;
use crate::error::Result;
use crate::generator::SchemaGenerator;
use crate::job::JobStage;
use crate::manifest::ManifestPatcher;
use crate::pipeline::{JobContext, StageHandler};
use async_trait::async_trait;

/// Patch the manifest, run the schema tool and collect its output
pub struct GenerateStage {
    patcher: ManifestPatcher,
    generator: SchemaGenerator,
}

impl GenerateStage {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            patcher: ManifestPatcher::from_config(&config.generator),
            generator: SchemaGenerator::from_config(&config.generator),
        }
    }
}

#[async_trait]
impl StageHandler for GenerateStage {
    fn stage(&self) -> JobStage {
        JobStage::Generating
    }

    async fn execute(&self, ctx: &mut JobContext) -> Result<()> {
        self.patcher.ensure_generator_dependency(&ctx.project_root).await?;
        self.generator
            .generate(&ctx.project_root, &ctx.bindings)
            .await?;
        ctx.artifacts = self.generator.collect_artifacts(&ctx.project_root).await?;
        Ok(())
    }
}
