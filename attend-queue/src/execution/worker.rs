use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::observability::{EventHub, QueueMetrics};
use crate::store::{Dispatch, FailureOutcome, JobStore};
use crate::{
    JobContext, JobError, JobEvent, JobId, Processor, ProgressReporter, ProgressSink, QueueConfig,
    QueueError, QueueResult,
};

/// State shared by the facade, the workers and the retry timers of one queue
pub(crate) struct QueueCore<P, R> {
    pub config: QueueConfig,
    pub store: Mutex<JobStore<P, R>>,
    pub events: EventHub,
    pub metrics: QueueMetrics,
    pub processor: RwLock<Option<Arc<dyn Processor<P, R>>>>,
    /// Wakes an idle worker when a job enters the pending sequence
    pub work_available: Notify,
    /// Time of the last dispatch, for `delay_between_jobs`
    dispatch_gate: tokio::sync::Mutex<Option<Instant>>,
}

impl<P, R> QueueCore<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(config: QueueConfig) -> Self {
        let events = EventHub::new(config.event_capacity);
        Self {
            config,
            store: Mutex::new(JobStore::new()),
            events,
            metrics: QueueMetrics::new(),
            processor: RwLock::new(None),
            work_available: Notify::new(),
            dispatch_gate: tokio::sync::Mutex::new(None),
        }
    }

    /// Take the next pending job, honoring the inter-dispatch delay.
    ///
    /// Returns the processor together with the job so an in-flight attempt
    /// keeps the processor it started with even if another is registered.
    /// Gives up without taking a job once shutdown is signalled, including
    /// while waiting out the delay.
    async fn next_dispatch(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Option<(Arc<dyn Processor<P, R>>, Dispatch<P>)> {
        let processor = self.processor.read().clone()?;

        let Some(delay) = self.config.delay_between_jobs else {
            return self.take_next().map(|job| (processor, job));
        };

        let mut last_dispatch = tokio::select! {
            gate = self.dispatch_gate.lock() => gate,
            _ = shutdown_signalled(shutdown_rx) => return None,
        };
        let pending = self.store.lock().stats().pending;
        if pending == 0 {
            return None;
        }
        if let Some(at) = *last_dispatch {
            tokio::select! {
                _ = tokio::time::sleep_until(at + delay) => {}
                _ = shutdown_signalled(shutdown_rx) => return None,
            }
        }
        if *shutdown_rx.borrow() {
            return None;
        }
        let job = self.take_next()?;
        *last_dispatch = Some(Instant::now());
        Some((processor, job))
    }

    fn take_next(&self) -> Option<Dispatch<P>> {
        let (job, more_pending) = {
            let mut store = self.store.lock();
            let job = store.take_next(Utc::now())?;
            (job, store.stats().pending > 0)
        };
        if more_pending {
            // Hand the rest to another idle worker
            self.work_available.notify_one();
        }
        self.metrics.increment_jobs_dispatched();
        self.events.emit(JobEvent::Active {
            job_id: job.id,
            attempt: job.attempt,
            at: Utc::now(),
        });
        Some(job)
    }

    /// Run one attempt and record its outcome. Never fails: processor errors
    /// and panics become job state.
    async fn execute(self: &Arc<Self>, processor: Arc<dyn Processor<P, R>>, job: Dispatch<P>) {
        let job_id = job.id;
        debug!("Processing job {} (attempt {})", job_id, job.attempt);

        let sink: Arc<dyn ProgressSink> = self.clone();
        let context = JobContext::new(job_id, job.payload, job.attempt, ProgressReporter::new(job_id, sink));

        let outcome = match AssertUnwindSafe(processor.process(context)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(JobError::new(panic_message(&*panic))),
        };

        match outcome {
            Ok(result) => self.finish_success(job_id, result),
            Err(err) => self.finish_failure(job_id, err),
        }
    }

    fn finish_success(&self, job_id: JobId, result: R) {
        if !self.store.lock().complete(job_id, result, Utc::now()) {
            return;
        }
        self.metrics.increment_jobs_completed();
        self.events.emit(JobEvent::Completed {
            job_id,
            at: Utc::now(),
        });
        info!("Job {} completed", job_id);
    }

    fn finish_failure(self: &Arc<Self>, job_id: JobId, err: JobError) {
        let message = err.message().to_string();
        let Some(outcome) = self.store.lock().record_failure(job_id, message.clone(), Utc::now()) else {
            return;
        };

        match outcome {
            FailureOutcome::Retry { attempt, delay } => {
                self.metrics.increment_jobs_retried();
                self.events.emit(JobEvent::Failed {
                    job_id,
                    attempt,
                    error: message,
                    terminal: false,
                    retry_in: Some(delay),
                    at: Utc::now(),
                });
                warn!(
                    "Job {} failed (attempt {}/{}), retrying in {:?}: {}",
                    job_id,
                    attempt,
                    self.max_attempts(job_id).unwrap_or(attempt),
                    delay,
                    err
                );
                self.schedule_requeue(job_id, delay);
            }
            FailureOutcome::Failed { attempt } => {
                self.metrics.increment_jobs_failed();
                self.events.emit(JobEvent::Failed {
                    job_id,
                    attempt,
                    error: message,
                    terminal: true,
                    retry_in: None,
                    at: Utc::now(),
                });
                error!("Job {} failed permanently after {} attempts: {}", job_id, attempt, err);
            }
        }
    }

    fn max_attempts(&self, job_id: JobId) -> Option<u32> {
        self.store.lock().get(job_id).map(|r| r.options.max_attempts)
    }

    /// Put a waiting job back at the pending tail once its delay elapses
    fn schedule_requeue(self: &Arc<Self>, job_id: JobId, delay: std::time::Duration) {
        let core = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if core.store.lock().requeue(job_id) {
                debug!("Job {} re-entered the pending sequence", job_id);
                core.work_available.notify_one();
            }
        });
    }
}

impl<P, R> ProgressSink for QueueCore<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn set_progress(&self, job_id: JobId, percent: u8) {
        let Some(progress) = self.store.lock().set_progress(job_id, percent) else {
            return;
        };
        self.events.emit(JobEvent::Progress {
            job_id,
            progress,
            at: Utc::now(),
        });
    }
}

/// Resolves once shutdown is requested or the pool handle is gone
async fn shutdown_signalled(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("processor panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("processor panicked: {}", message)
    } else {
        "processor panicked".to_string()
    }
}

/// Fixed-size pool of workers pulling from one queue's pending sequence.
///
/// The pool size is the queue's concurrency limit: each worker runs at most
/// one job at a time, so the active set can never outgrow it.
pub(crate) struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<P, R>(core: Arc<QueueCore<P, R>>) -> Self
    where
        P: Clone + Send + Sync + 'static,
        R: Clone + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let size = core.config.concurrency;

        let joins = (0..size)
            .map(|worker_id| {
                let core = Arc::clone(&core);
                let shutdown_rx = shutdown_rx.clone();
                let span = info_span!("worker", queue = %core.config.name, worker_id);
                tokio::spawn(worker_loop(core, shutdown_rx).instrument(span))
            })
            .collect();

        info!("Started {} workers for queue '{}'", size, core.config.name);
        Self { shutdown_tx, joins }
    }

    /// Stop taking new jobs and wait for in-flight attempts to finish
    pub async fn shutdown(mut self) -> QueueResult<()> {
        let _ = self.shutdown_tx.send(true);
        for join in std::mem::take(&mut self.joins) {
            join.await
                .map_err(|e| QueueError::Internal(format!("Worker join error: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    /// Workers finish their current attempt and exit
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn worker_loop<P, R>(core: Arc<QueueCore<P, R>>, mut shutdown_rx: watch::Receiver<bool>)
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // Register interest before looking, so a job enqueued in between still wakes us
        let notified = core.work_available.notified();

        if let Some((processor, job)) = core.next_dispatch(&mut shutdown_rx).await {
            let span = info_span!("job", job_id = %job.id, attempt = job.attempt);
            core.execute(processor, job).instrument(span).await;
            continue;
        }

        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(core.config.poll_interval) => {}
            _ = shutdown_signalled(&mut shutdown_rx) => break,
        }
    }
    debug!("Worker stopped");
}
