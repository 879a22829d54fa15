// Stage implementations
pub mod analyze_stage;
pub mod fetch_stage;
pub mod generate_stage;
pub mod persist_stage;

// Re-exports
pub use analyze_stage::AnalyzeStage;
pub use fetch_stage::FetchStage;
pub use generate_stage::GenerateStage;
pub use persist_stage::PersistStage;

use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::pipeline::Pipeline;
use std::sync::Arc;

/// fetch -> analyze -> generate -> persist
pub fn default_pipeline(ctx: &WorkerContext, config: &WorkerConfig) -> Pipeline {
    let mut pipeline = Pipeline::new();
    pipeline.register_handler(Arc::new(FetchStage::new(ctx.sources.clone(), config)));
    pipeline.register_handler(Arc::new(AnalyzeStage::new(ctx.producer.clone())));
    pipeline.register_handler(Arc::new(GenerateStage::new(config)));
    pipeline.register_handler(Arc::new(PersistStage::new(
        ctx.schemas.clone(),
        ctx.results.clone(),
        ctx.publisher.clone(),
    )));
    pipeline
}
