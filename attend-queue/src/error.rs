use thiserror::Error;

use crate::JobId;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors returned by the queue facade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {0} is not in the failed state")]
    NotFailed(JobId),

    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(String),

    #[error("Queue workers have been shut down")]
    WorkerShutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure reported by a processor for one attempt.
///
/// Every processor failure is treated as transient: the queue retries it until
/// the job's attempt budget is spent, then marks the job failed with this message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct JobError {
    message: String,
}

impl JobError {
    /// Create an error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Wrap any error, keeping its display text
    pub fn from_err<E: std::error::Error>(err: E) -> Self {
        Self::new(err.to_string())
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for JobError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for JobError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("Serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_error_keeps_message() {
        let err = JobError::from("Attendance 42 not found");
        assert_eq!(err.message(), "Attendance 42 not found");
        assert_eq!(err.to_string(), "Attendance 42 not found");
    }

    #[test]
    fn job_error_wraps_std_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "smtp relay refused");
        assert_eq!(JobError::from_err(io).message(), "smtp relay refused");
    }

    #[test]
    fn queue_error_display() {
        assert_eq!(QueueError::JobNotFound(JobId::from(7)).to_string(), "Job not found: 7");
    }
}
