/*
 * cwscan Orchestration - contract schema extraction worker
 *
 * One queued source bundle per tick, end to end:
 * - Job State Machine (leased → fetching → analyzing → generating → persisting)
 * - Pipeline Stages (pluggable StageHandlers over a JobContext)
 * - Lease + scratch cleanup guards
 * - Result recording and downstream publish queue
 */

#![allow(clippy::should_implement_trait)] // from_str naming intentional

// Public modules
pub mod artifacts;
pub mod config;
pub mod context;
pub mod error;
pub mod fetcher;
pub mod generator;
pub mod job;
pub mod lifecycle;
pub mod manifest;
pub mod pipeline;
pub mod publisher;
pub mod stages;

// Re-exports
pub use artifacts::{match_entry_function, store_artifacts, upload_name};
pub use config::{ConfigError, WorkerConfig};
pub use context::{build_producer, InMemoryBackend, WorkerContext};
pub use error::{ErrorCategory, OrchestratorError, Result};
pub use fetcher::{fetch_source, resolve_crate_root, ScratchDir, SourceMetadata};
pub use generator::{render_script, SchemaArtifact, SchemaGenerator};
pub use job::{Job, JobStage, JobState, JobStateMachine};
pub use lifecycle::{LeaseGuard, LifecycleManager, TickOutcome};
pub use manifest::{read_crate_name, ManifestPatcher};
pub use pipeline::{JobContext, Pipeline, StageHandler};
pub use publisher::{PublishMessage, PublishReport, Publisher};
pub use stages::{default_pipeline, AnalyzeStage, FetchStage, GenerateStage, PersistStage};
