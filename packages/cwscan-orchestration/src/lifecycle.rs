//! Job lifecycle manager
//!
//! One tick leases at most one job and drives it to a terminal state:
//!
//! ```text
//! Idle → Leased → Fetching → Analyzing → Generating → Persisting → Completed
//!                    └──────────┴────────────┴────────────┴──────→ Failed
//! ```
//!
//! Both terminal states acknowledge the lease and remove the scratch
//! directory. A failure is written to the job record and never re-raised.

use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::error::{OrchestratorError, Result};
use crate::fetcher::ScratchDir;
use crate::job::{Job, JobState, JobStateMachine};
use crate::pipeline::JobContext;
use crate::stages::default_pipeline;
use cwscan_storage::{JobQueue, JobRecordUpdate};
use std::future::Future;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Result of one [`LifecycleManager::tick`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No connected backend, or the queue could not be queried
    Unavailable,
    /// Nothing visible in the queue
    Idle,
    /// Job for this source completed
    Completed(String),
    /// Job for this source failed, error recorded
    Failed(String),
}

/// Acknowledges a lease exactly once
///
/// Prefer [`LeaseGuard::release`]; a guard dropped unreleased acks from a
/// spawned task.
pub struct LeaseGuard {
    queue: Arc<dyn JobQueue>,
    ack: Option<String>,
}

impl LeaseGuard {
    pub fn new(queue: Arc<dyn JobQueue>, ack: impl Into<String>) -> Self {
        Self {
            queue,
            ack: Some(ack.into()),
        }
    }

    pub async fn release(mut self) -> Result<()> {
        if let Some(ack) = self.ack.take() {
            self.queue.ack(&ack).await?;
        }
        Ok(())
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(ack) = self.ack.take() else {
            return;
        };
        let queue = self.queue.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = queue.ack(&ack).await {
                        warn!("Failed to acknowledge dropped lease {}: {}", ack, e);
                    }
                });
            }
            Err(_) => warn!("Lease {} dropped outside a runtime, left to expire", ack),
        }
    }
}

pub struct LifecycleManager {
    config: WorkerConfig,
    context: Option<WorkerContext>,
}

impl LifecycleManager {
    /// Disconnected manager, call [`init`](Self::init) before ticking
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            context: None,
        }
    }

    /// Manager attached to an existing context
    pub fn with_context(config: WorkerConfig, context: WorkerContext) -> Self {
        Self {
            config,
            context: Some(context),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    /// Connect the durable backend
    pub fn init(&mut self) -> Result<()> {
        let context = WorkerContext::connect(&self.config)?;
        self.context = Some(context);
        info!("Worker connected");
        Ok(())
    }

    /// Detach the context; later ticks report `Unavailable`
    pub fn shutdown(&mut self) {
        if self.context.take().is_some() {
            info!("Worker disconnected");
        }
    }

    /// Process at most one job
    pub async fn tick(&self) -> TickOutcome {
        let Some(ctx) = &self.context else {
            debug!("Not connected");
            return TickOutcome::Unavailable;
        };

        match ctx.queue.size().await {
            Ok(0) => {
                debug!("Nothing in queue");
                return TickOutcome::Idle;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Queue depth unavailable: {}", e);
                return TickOutcome::Unavailable;
            }
        }

        let item = match ctx.queue.get().await {
            Ok(Some(item)) => item,
            Ok(None) => return TickOutcome::Idle,
            Err(e) => {
                warn!("Failed to lease a job: {}", e);
                return TickOutcome::Unavailable;
            }
        };

        let lease = LeaseGuard::new(ctx.queue.clone(), item.ack.clone());
        let job = Job::leased(item);
        let source_id = job.source_id.clone();
        info!("Job {} leased for source {} (try {})", job.id, source_id, job.tries);

        let job = self.process(ctx, job).await;

        if let Err(e) = lease.release().await {
            warn!("Failed to acknowledge job {}: {}", job.id, e);
        }

        match job.state {
            JobState::Completed { .. } => TickOutcome::Completed(source_id),
            _ => TickOutcome::Failed(source_id),
        }
    }

    /// Run the pipeline and record the outcome; returns the terminal job
    async fn process(&self, ctx: &WorkerContext, job: Job) -> Job {
        let mut sm = JobStateMachine::new(job);

        let result = match ScratchDir::create(&self.config.sources_save_path) {
            Ok(scratch) => {
                let mut job_ctx = JobContext::new(sm.job().source_id.clone(), scratch);
                let pipeline = default_pipeline(ctx, &self.config);
                let result = pipeline.run(&mut sm, &mut job_ctx).await;

                let artifacts = job_ctx.schemas.len();
                if let Err(e) = job_ctx.scratch.close() {
                    warn!("Failed to remove scratch directory: {}", e);
                }
                result.map(|()| artifacts)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(artifacts) => self.complete(&mut sm, artifacts),
            Err(e) => self.fail(ctx, &mut sm, e).await,
        }
        sm.into_job()
    }

    fn complete(&self, sm: &mut JobStateMachine, artifacts: usize) {
        if let Err(e) = sm.complete(artifacts) {
            error!("Job {} could not complete: {}", sm.job().id, e);
            return;
        }
        if let JobState::Completed { duration_ms, .. } = &sm.job().state {
            info!(
                "Job {} completed: {} artifacts for source {} in {}ms",
                sm.job().id,
                artifacts,
                sm.job().source_id,
                duration_ms
            );
        }
    }

    async fn fail(&self, ctx: &WorkerContext, sm: &mut JobStateMachine, err: OrchestratorError) {
        let message = err.to_string();
        let category = err.category();
        let source_id = sm.job().source_id.clone();

        error!(
            "Job {} failed at {} ({}): {}",
            sm.job().id,
            sm.job().state.state_name(),
            category,
            message
        );

        if let Err(e) = sm.fail(message.clone(), category) {
            warn!("Job {}: {}", sm.job().id, e);
        }

        if source_id.trim().is_empty() {
            return;
        }
        if let Err(e) = ctx
            .results
            .update_job_record(&source_id, &JobRecordUpdate::failed(message))
            .await
        {
            error!("Error while setting error result for '{}': {}", source_id, e);
        }
    }

    /// Tick on the configured interval until `shutdown` resolves
    ///
    /// Reconnects on each interval while disconnected. A tick in progress
    /// always finishes before shutdown is observed.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            "Polling {} every {}ms",
            self.config.queue.name, self.config.queue.poll_interval_ms
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    if !self.is_connected() {
                        if let Err(e) = self.init() {
                            warn!("Failed to connect to database: {}", e);
                            continue;
                        }
                    }
                    let outcome = self.tick().await;
                    debug!("Tick finished: {:?}", outcome);
                }
            }
        }

        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwscan_storage::InMemoryQueue;
    use std::time::Duration;

    #[tokio::test]
    async fn test_disconnected_tick_is_unavailable() {
        let manager = LifecycleManager::new(WorkerConfig::default());
        assert!(!manager.is_connected());
        assert_eq!(manager.tick().await, TickOutcome::Unavailable);
    }

    #[tokio::test]
    async fn test_lease_guard_release_acks() {
        let queue = InMemoryQueue::new(Duration::from_secs(60));
        queue.add("source").await.unwrap();
        let item = queue.get().await.unwrap().unwrap();

        let guard = LeaseGuard::new(Arc::new(queue.clone()), item.ack);
        guard.release().await.unwrap();
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dropped_lease_guard_acks_in_background() {
        let queue = InMemoryQueue::new(Duration::from_secs(60));
        queue.add("source").await.unwrap();
        let item = queue.get().await.unwrap().unwrap();

        drop(LeaseGuard::new(Arc::new(queue.clone()), item.ack));
        for _ in 0..50 {
            if queue.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_init_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            database_path: dir.path().join("worker.db"),
            ..WorkerConfig::default()
        };

        let mut manager = LifecycleManager::new(config);
        manager.init().unwrap();
        assert!(manager.is_connected());
        assert_eq!(manager.tick().await, TickOutcome::Idle);

        manager.shutdown();
        assert_eq!(manager.tick().await, TickOutcome::Unavailable);
    }
}
