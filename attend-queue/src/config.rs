use std::time::Duration;

use crate::{Backoff, BackoffKind, JobOptions, QueueError, QueueResult};

/// Configuration for one queue instance
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name used in logs
    pub name: String,
    /// Maximum number of jobs processed at once (worker pool size)
    pub concurrency: usize,
    /// Minimum spacing between two dispatches, for rate-limited downstreams
    pub delay_between_jobs: Option<Duration>,
    /// How long an idle worker sleeps before re-checking the pending sequence
    pub poll_interval: Duration,
    /// Options applied to jobs that do not override them
    pub default_job_options: JobOptions,
    /// Capacity of the broadcast channel behind `event_stream`
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            concurrency: 1,
            delay_between_jobs: None,
            poll_interval: Duration::from_millis(100),
            default_job_options: JobOptions::default(),
            event_capacity: 1000,
        }
    }
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Certificate generation: five PDFs at a time, short exponential backoff
    pub fn certificate_generation() -> Self {
        Self::new("certificate-generation")
            .with_concurrency(5)
            .with_default_job_options(JobOptions::new(
                3,
                Backoff::exponential(Duration::from_millis(2000)),
            ))
    }

    /// Email dispatch: one message at a time, two seconds apart, to stay under
    /// the SMTP relay's login rate limit
    pub fn email_dispatch() -> Self {
        Self::new("email-sending")
            .with_concurrency(1)
            .with_delay_between_jobs(Duration::from_millis(2000))
            .with_default_job_options(JobOptions::new(
                5,
                Backoff::exponential(Duration::from_millis(5000)),
            ))
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_delay_between_jobs(mut self, delay: Duration) -> Self {
        self.delay_between_jobs = Some(delay);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_default_job_options(mut self, options: JobOptions) -> Self {
        self.default_job_options = options;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Override fields from `{PREFIX}_*` environment variables.
    ///
    /// Unset or unparsable variables keep the value from `self`.
    pub fn from_env(self, prefix: &str) -> Self {
        self.from_lookup(prefix, |key| std::env::var(key).ok())
    }

    fn from_lookup(mut self, prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |suffix: &str| lookup(&format!("{}_{}", prefix, suffix));

        if let Some(concurrency) = var("CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.concurrency = concurrency;
        }
        if let Some(ms) = var("DELAY_BETWEEN_JOBS_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.delay_between_jobs = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(ms) = var("POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = var("ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.default_job_options.max_attempts = attempts;
        }
        if let Some(kind) = var("BACKOFF_KIND").and_then(|v| v.parse::<BackoffKind>().ok()) {
            self.default_job_options.backoff.kind = kind;
        }
        if let Some(ms) = var("BACKOFF_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.default_job_options.backoff.base_delay = Duration::from_millis(ms);
        }
        self
    }

    /// Reject configurations the worker pool cannot run
    pub fn validate(&self) -> QueueResult<()> {
        if self.concurrency == 0 {
            return Err(QueueError::InvalidConfig(format!(
                "queue '{}': concurrency must be at least 1",
                self.name
            )));
        }
        if self.default_job_options.max_attempts == 0 {
            return Err(QueueError::InvalidConfig(format!(
                "queue '{}': max_attempts must be at least 1",
                self.name
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(QueueError::InvalidConfig(format!(
                "queue '{}': poll_interval must be greater than zero",
                self.name
            )));
        }
        if self.event_capacity == 0 {
            return Err(QueueError::InvalidConfig(format!(
                "queue '{}': event_capacity must be at least 1",
                self.name
            )));
        }
        Ok(())
    }
}

/// Retention policy for the recurring clean of completed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanPolicy {
    /// How often the cleaner runs
    pub interval: Duration,
    /// Completed jobs older than this are evictable
    pub max_age: Duration,
    /// Most recent completed jobs kept regardless of age
    pub max_keep: usize,
}

impl CleanPolicy {
    /// Reject a zero interval, which the cleaner's timer cannot run on
    pub fn validate(&self) -> QueueResult<()> {
        if self.interval.is_zero() {
            return Err(QueueError::InvalidConfig(
                "clean interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CleanPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            max_age: Duration::from_secs(24 * 3600),
            max_keep: 1000,
        }
    }
}
