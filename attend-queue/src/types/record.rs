use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobOptions};

/// Job status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is in the pending sequence waiting for a worker
    Pending,

    /// Job is currently being processed
    Active,

    /// Job failed and is waiting out its retry delay
    Waiting,

    /// Job completed successfully
    Completed,

    /// Job failed permanently (attempt budget spent)
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state (completed or failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Get the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Job record - the unit of work and its runtime state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord<P, R> {
    /// Unique job identifier
    pub id: JobId,

    /// Caller-supplied data, never inspected by the queue
    pub payload: P,

    /// Resolved options (queue defaults merged with producer overrides)
    pub options: JobOptions,

    /// Number of executions started so far
    pub attempts: u32,

    pub status: JobStatus,

    /// Caller-reported progress, 0 to 100
    pub progress: u8,

    pub created_at: DateTime<Utc>,

    /// First dispatch
    pub started_at: Option<DateTime<Utc>>,

    /// Most recent dispatch
    pub last_attempt_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    pub failed_at: Option<DateTime<Utc>>,

    /// Last failure message
    pub error: Option<String>,

    /// Value returned by the processor on success
    pub result: Option<R>,
}

impl<P, R> JobRecord<P, R> {
    /// Create a new pending job record
    pub fn new(id: JobId, payload: P, options: JobOptions) -> Self {
        Self {
            id,
            payload,
            options,
            attempts: 0,
            status: JobStatus::Pending,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            last_attempt_at: None,
            completed_at: None,
            failed_at: None,
            error: None,
            result: None,
        }
    }

    /// Check whether another attempt is allowed after a failure
    pub fn can_retry(&self) -> bool {
        self.attempts < self.options.max_attempts
    }

    /// Begin an execution attempt
    pub(crate) fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Active;
        self.attempts += 1;
        self.started_at.get_or_insert(now);
        self.last_attempt_at = Some(now);
    }

    /// Complete the job successfully
    pub(crate) fn complete(&mut self, result: R, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(now);
    }

    /// Record a failed attempt that will be retried
    pub(crate) fn wait_for_retry(&mut self, error: String) {
        self.status = JobStatus::Waiting;
        self.error = Some(error);
    }

    /// Fail the job permanently
    pub(crate) fn fail(&mut self, error: String, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.failed_at = Some(now);
    }

    /// Give a failed job a fresh attempt budget
    pub(crate) fn reset_for_retry(&mut self) {
        self.status = JobStatus::Pending;
        self.attempts = 0;
        self.progress = 0;
        self.failed_at = None;
    }
}
