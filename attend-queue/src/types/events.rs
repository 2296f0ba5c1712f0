use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::JobId;
use super::options::duration_ms;

/// Lifecycle notifications emitted by a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum JobEvent {
    /// Job was enqueued
    Added {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// Job was dispatched to the processor
    Active {
        job_id: JobId,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// Processor reported progress
    Progress {
        job_id: JobId,
        progress: u8,
        at: DateTime<Utc>,
    },

    /// Job completed successfully
    Completed {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// An attempt failed.
    ///
    /// `terminal` is false when a retry has been scheduled after `retry_in`,
    /// true when the attempt budget is spent and the job is now failed.
    Failed {
        job_id: JobId,
        attempt: u32,
        error: String,
        terminal: bool,
        #[serde(default, with = "option_duration_ms")]
        retry_in: Option<Duration>,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Active { .. } => "active",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Added { job_id, .. }
            | Self::Active { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => *job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Added { at, .. }
            | Self::Active { at, .. }
            | Self::Progress { at, .. }
            | Self::Completed { at, .. }
            | Self::Failed { at, .. } => at,
        }
    }

    /// True for a failure that ends the job's lifecycle
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Failed { terminal: true, .. })
    }
}

mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => super::duration_ms::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
