use std::fmt;
use std::sync::Arc;

use crate::JobId;

/// Receiver of progress updates for jobs of one queue
pub trait ProgressSink: Send + Sync {
    fn set_progress(&self, job_id: JobId, percent: u8);
}

/// Reports progress for a single job; cheap to clone
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub fn new(job_id: JobId, sink: Arc<dyn ProgressSink>) -> Self {
        Self { job_id, sink }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Record progress (clamped to 100) and emit a `progress` event.
    ///
    /// Does nothing if the job has already been evicted.
    pub async fn report(&self, percent: u8) {
        self.sink.set_progress(self.job_id, percent);
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").field("job_id", &self.job_id).finish()
    }
}

/// What a processor receives for one execution attempt
#[derive(Debug, Clone)]
pub struct JobContext<P> {
    pub id: JobId,

    /// Copy of the job payload
    pub payload: P,

    /// 1 for the first execution, incremented on every retry
    pub attempt: u32,

    progress: ProgressReporter,
}

impl<P> JobContext<P> {
    pub fn new(id: JobId, payload: P, attempt: u32, progress: ProgressReporter) -> Self {
        Self {
            id,
            payload,
            attempt,
            progress,
        }
    }

    pub async fn report_progress(&self, percent: u8) {
        self.progress.report(percent).await;
    }

    /// Reporter that outlives this context, e.g. for a spawned sub-task
    pub fn progress_reporter(&self) -> ProgressReporter {
        self.progress.clone()
    }
}
