use crate::error::{ErrorCategory, OrchestratorError, Result};
use chrono::{DateTime, Utc};
use cwscan_storage::QueueItem;
use serde::{Deserialize, Serialize};

/// Pipeline stage identifier, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobStage {
    Fetching,
    Analyzing,
    Generating,
    Persisting,
}

impl JobStage {
    pub const ALL: [JobStage; 4] = [
        JobStage::Fetching,
        JobStage::Analyzing,
        JobStage::Generating,
        JobStage::Persisting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Fetching => "fetching",
            JobStage::Analyzing => "analyzing",
            JobStage::Generating => "generating",
            JobStage::Persisting => "persisting",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "fetching" => Ok(JobStage::Fetching),
            "analyzing" => Ok(JobStage::Analyzing),
            "generating" => Ok(JobStage::Generating),
            "persisting" => Ok(JobStage::Persisting),
            _ => Err(OrchestratorError::parse(format!("Invalid stage: {}", s))),
        }
    }

    /// Stage that must precede this one
    fn predecessor(&self) -> Option<JobStage> {
        match self {
            JobStage::Fetching => None,
            JobStage::Analyzing => Some(JobStage::Fetching),
            JobStage::Generating => Some(JobStage::Analyzing),
            JobStage::Persisting => Some(JobStage::Generating),
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobState {
    Leased {
        leased_at: DateTime<Utc>,
    },
    Running {
        started_at: DateTime<Utc>,
        current_stage: JobStage,
    },
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        duration_ms: u64,
        artifacts: usize,
    },
    Failed {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        error: String,
        error_category: ErrorCategory,
        failed_stage: Option<JobStage>,
    },
}

impl JobState {
    pub fn state_name(&self) -> &'static str {
        match self {
            JobState::Leased { .. } => "leased",
            JobState::Running { current_stage, .. } => current_stage.as_str(),
            JobState::Completed { .. } => "completed",
            JobState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed { .. } | JobState::Failed { .. })
    }
}

/// Leased job
///
/// `source_id` is the queue payload: the blob id of the source bundle.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub source_id: String,
    pub lease_token: String,
    pub tries: u32,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a job from a freshly leased queue item
    pub fn leased(item: QueueItem) -> Self {
        let now = Utc::now();
        Self {
            id: item.id,
            source_id: item.payload,
            lease_token: item.ack,
            tries: item.tries,
            state: JobState::Leased { leased_at: now },
            created_at: now,
            updated_at: now,
        }
    }

    /// Stage the job is in, if running
    pub fn current_stage(&self) -> Option<JobStage> {
        match &self.state {
            JobState::Running { current_stage, .. } => Some(*current_stage),
            _ => None,
        }
    }
}

/// Job state machine for transitions
pub struct JobStateMachine {
    job: Job,
}

impl JobStateMachine {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn into_job(self) -> Job {
        self.job
    }

    fn invalid(&self, to: &str) -> OrchestratorError {
        OrchestratorError::InvalidStateTransition {
            from: self.job.state.state_name().to_string(),
            to: to.to_string(),
        }
    }

    /// Transition: LEASED → FETCHING → ANALYZING → GENERATING → PERSISTING
    ///
    /// Stages must be entered in order, skipping or repeating one is rejected.
    pub fn advance(&mut self, stage: JobStage) -> Result<()> {
        let now = Utc::now();
        let started_at = match (&self.job.state, stage.predecessor()) {
            (JobState::Leased { .. }, None) => now,
            (
                JobState::Running {
                    started_at,
                    current_stage,
                },
                Some(expected),
            ) if *current_stage == expected => *started_at,
            _ => return Err(self.invalid(stage.as_str())),
        };

        self.job.state = JobState::Running {
            started_at,
            current_stage: stage,
        };
        self.job.updated_at = now;
        Ok(())
    }

    /// Transition: PERSISTING → COMPLETED
    pub fn complete(&mut self, artifacts: usize) -> Result<()> {
        match &self.job.state {
            JobState::Running {
                started_at,
                current_stage: JobStage::Persisting,
            } => {
                let now = Utc::now();
                let duration_ms = (now - *started_at).num_milliseconds().max(0) as u64;

                self.job.state = JobState::Completed {
                    started_at: *started_at,
                    completed_at: now,
                    duration_ms,
                    artifacts,
                };
                self.job.updated_at = now;
                Ok(())
            }
            _ => Err(self.invalid("completed")),
        }
    }

    /// Transition: LEASED | RUNNING → FAILED
    pub fn fail(&mut self, error: String, error_category: ErrorCategory) -> Result<()> {
        let now = Utc::now();
        let (started_at, failed_stage) = match &self.job.state {
            JobState::Leased { leased_at } => (*leased_at, None),
            JobState::Running {
                started_at,
                current_stage,
            } => (*started_at, Some(*current_stage)),
            _ => return Err(self.invalid("failed")),
        };

        self.job.state = JobState::Failed {
            started_at,
            failed_at: now,
            error,
            error_category,
            failed_stage,
        };
        self.job.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leased_job() -> Job {
        Job::leased(QueueItem {
            id: "item-1".to_string(),
            ack: "ack-1".to_string(),
            payload: "source-1".to_string(),
            tries: 1,
        })
    }

    fn run_all(sm: &mut JobStateMachine) {
        for stage in JobStage::ALL {
            sm.advance(stage).unwrap();
        }
    }

    #[test]
    fn test_stage_roundtrip() {
        for stage in &JobStage::ALL {
            let parsed = JobStage::from_str(stage.as_str()).unwrap();
            assert_eq!(*stage, parsed);
        }
        assert!(JobStage::from_str("queued").is_err());
    }

    #[test]
    fn test_job_from_queue_item() {
        let job = leased_job();
        assert_eq!(job.source_id, "source-1");
        assert_eq!(job.lease_token, "ack-1");
        assert!(matches!(job.state, JobState::Leased { .. }));
    }

    #[test]
    fn test_full_pipeline_to_completed() {
        let mut sm = JobStateMachine::new(leased_job());
        run_all(&mut sm);
        assert_eq!(sm.job().current_stage(), Some(JobStage::Persisting));

        sm.complete(2).unwrap();
        match &sm.job().state {
            JobState::Completed { artifacts, .. } => assert_eq!(*artifacts, 2),
            _ => panic!("Expected Completed state"),
        }
        assert!(sm.job().state.is_terminal());
    }

    #[test]
    fn test_stages_cannot_be_skipped() {
        let mut sm = JobStateMachine::new(leased_job());
        let err = sm.advance(JobStage::Analyzing).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidStateTransition { ref from, ref to }
                if from == "leased" && to == "analyzing"
        ));

        sm.advance(JobStage::Fetching).unwrap();
        assert!(sm.advance(JobStage::Generating).is_err());
        assert!(sm.advance(JobStage::Fetching).is_err());
    }

    #[test]
    fn test_complete_requires_persisting() {
        let mut sm = JobStateMachine::new(leased_job());
        sm.advance(JobStage::Fetching).unwrap();
        assert!(sm.complete(0).is_err());
    }

    #[test]
    fn test_fail_records_stage() {
        let mut sm = JobStateMachine::new(leased_job());
        sm.advance(JobStage::Fetching).unwrap();
        sm.advance(JobStage::Analyzing).unwrap();
        sm.fail("no bindings".to_string(), ErrorCategory::Permanent)
            .unwrap();

        match &sm.job().state {
            JobState::Failed {
                error,
                failed_stage,
                ..
            } => {
                assert_eq!(error, "no bindings");
                assert_eq!(*failed_stage, Some(JobStage::Analyzing));
            }
            _ => panic!("Expected Failed state"),
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut sm = JobStateMachine::new(leased_job());
        run_all(&mut sm);
        sm.complete(1).unwrap();

        assert!(sm.fail("too late".to_string(), ErrorCategory::Permanent).is_err());
        assert!(sm.advance(JobStage::Fetching).is_err());
    }
}
