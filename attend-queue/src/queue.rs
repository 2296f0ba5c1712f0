use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::execution::worker::{QueueCore, WorkerPool};
use crate::observability::{BoxStream, EventListener, ListenerId, MetricsSnapshot};
use crate::{
    JobEvent, JobId, JobOptionsPatch, JobRecord, Processor, ProgressReporter, ProgressSink,
    QueueConfig, QueueError, QueueResult, QueueStats,
};

/// Returned by `enqueue`: the job id plus a way to report progress from
/// outside the processor.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    progress: ProgressReporter,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub async fn report_progress(&self, percent: u8) {
        self.progress.report(percent).await;
    }
}

enum PoolState {
    /// No processor registered yet
    Idle,
    Running(WorkerPool),
    Stopped,
}

/// In-process job queue.
///
/// Jobs are accepted at any time and dispatched FIFO to the registered
/// processor by `concurrency` workers. Failed attempts are retried after the
/// job's backoff delay until its attempt budget is spent. Cloning is cheap and
/// every clone refers to the same queue.
///
/// Dropping the last clone stops the workers after their current attempt
/// without waiting for them; call `shutdown` to wait.
pub struct JobQueue<P, R> {
    core: Arc<QueueCore<P, R>>,
    pool: Arc<Mutex<PoolState>>,
}

impl<P, R> Clone for JobQueue<P, R> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<P, R> JobQueue<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        config.validate()?;
        info!(
            "Created queue '{}' (concurrency {}, delay between jobs {:?})",
            config.name, config.concurrency, config.delay_between_jobs
        );
        Ok(Self {
            core: Arc::new(QueueCore::new(config)),
            pool: Arc::new(Mutex::new(PoolState::Idle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.core.config.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.core.config
    }

    /// Add a job to the tail of the pending sequence.
    ///
    /// `options` override the queue defaults field by field. The job is
    /// accepted even if no processor is registered yet.
    #[instrument(skip(self, payload, options), fields(queue = %self.core.config.name))]
    pub fn enqueue(&self, payload: P, options: Option<JobOptionsPatch>) -> JobHandle {
        let resolved = match &options {
            Some(patch) => self.core.config.default_job_options.merge(patch),
            None => self.core.config.default_job_options,
        };

        let id = self.core.store.lock().insert(payload, resolved);
        self.core.metrics.increment_jobs_enqueued();
        self.core.events.emit(JobEvent::Added { job_id: id, at: Utc::now() });
        self.core.work_available.notify_one();

        info!("Added job {} to queue", id);

        let sink: Arc<dyn ProgressSink> = self.core.clone();
        JobHandle {
            id,
            progress: ProgressReporter::new(id, sink),
        }
    }

    /// Set the queue's processor and start the workers.
    ///
    /// Registering again replaces the processor for future dispatches;
    /// attempts already running finish with the processor they started with.
    /// Must be called from within a tokio runtime.
    pub fn register_processor(&self, processor: impl Processor<P, R>) -> QueueResult<()> {
        let mut pool = self.pool.lock();
        if matches!(*pool, PoolState::Stopped) {
            return Err(QueueError::WorkerShutdown);
        }

        *self.core.processor.write() = Some(Arc::new(processor));

        if matches!(*pool, PoolState::Idle) {
            tokio::runtime::Handle::try_current()
                .map_err(|e| QueueError::Internal(format!("No tokio runtime: {}", e)))?;
            *pool = PoolState::Running(WorkerPool::spawn(Arc::clone(&self.core)));
        } else {
            info!("Replaced processor for queue '{}'", self.core.config.name);
        }

        // Jobs enqueued before registration are already waiting
        self.core.work_available.notify_waiters();
        Ok(())
    }

    pub fn list_pending(&self) -> Vec<JobRecord<P, R>> {
        self.core.store.lock().list_pending()
    }

    pub fn list_active(&self) -> Vec<JobRecord<P, R>> {
        self.core.store.lock().list_active()
    }

    /// Jobs sitting out a retry delay
    pub fn list_waiting(&self) -> Vec<JobRecord<P, R>> {
        self.core.store.lock().list_waiting()
    }

    pub fn list_completed(&self) -> Vec<JobRecord<P, R>> {
        self.core.store.lock().list_completed()
    }

    pub fn list_failed(&self) -> Vec<JobRecord<P, R>> {
        self.core.store.lock().list_failed()
    }

    pub fn stats(&self) -> QueueStats {
        self.core.store.lock().stats()
    }

    pub fn get_job(&self, id: JobId) -> QueueResult<JobRecord<P, R>> {
        self.core
            .store
            .lock()
            .get(id)
            .cloned()
            .ok_or(QueueError::JobNotFound(id))
    }

    /// True when nothing is pending, running or waiting for a retry
    pub fn is_idle(&self) -> bool {
        self.stats().is_drained()
    }

    /// Evict completed jobs older than `max_age`, always keeping the
    /// `max_keep` most recently completed. Returns how many were evicted.
    ///
    /// Pending, active, waiting and failed jobs are never touched.
    pub fn clean(&self, max_age: Duration, max_keep: usize) -> usize {
        let evicted = self.core.store.lock().clean(Utc::now(), max_age, max_keep);
        let count = evicted.len();

        if count > 0 {
            self.core.metrics.add_jobs_evicted(count as u64);
            info!("Cleaned {} old jobs from queue '{}'", count, self.core.config.name);
        } else {
            debug!("No completed jobs to clean in queue '{}'", self.core.config.name);
        }
        count
    }

    /// Put a failed job back in the pending sequence with a fresh attempt budget
    pub fn retry_failed(&self, id: JobId) -> QueueResult<()> {
        self.core.store.lock().retry_failed(id)?;
        self.requeued(id);
        Ok(())
    }

    /// Retry every failed job, oldest failure first. Returns how many were requeued.
    pub fn retry_all_failed(&self) -> usize {
        let ids = {
            let mut store = self.core.store.lock();
            let ids = store.failed_ids();
            ids.into_iter()
                .filter(|id| store.retry_failed(*id).is_ok())
                .collect::<Vec<_>>()
        };
        for id in &ids {
            self.requeued(*id);
        }
        ids.len()
    }

    fn requeued(&self, id: JobId) {
        self.core.events.emit(JobEvent::Added { job_id: id, at: Utc::now() });
        self.core.work_available.notify_one();
        info!("Retrying failed job {}", id);
    }

    /// Register a synchronous listener for every job event
    pub fn on(&self, listener: impl Fn(&JobEvent) + Send + Sync + 'static) -> ListenerId {
        let listener: EventListener = Arc::new(listener);
        self.core.events.on(listener)
    }

    /// Remove a listener; returns false if it was not registered
    pub fn off(&self, id: ListenerId) -> bool {
        self.core.events.off(id)
    }

    /// Events emitted from now on, for async consumers
    pub fn event_stream(&self) -> BoxStream<JobEvent> {
        self.core.events.stream()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    /// Stop dispatching and wait for running attempts to finish.
    ///
    /// Pending and waiting jobs stay in the store. The queue keeps accepting
    /// jobs but nothing will run them.
    pub async fn shutdown(&self) -> QueueResult<()> {
        let state = {
            let mut pool = self.pool.lock();
            std::mem::replace(&mut *pool, PoolState::Stopped)
        };
        if let PoolState::Running(pool) = state {
            pool.shutdown().await?;
            info!("Queue '{}' shut down", self.core.config.name);
        }
        Ok(())
    }
}
