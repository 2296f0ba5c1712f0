//! # attend-queue: In-Process Background Jobs
//!
//! Run slow work (PDF certificates, outbound email) off the request path
//! inside the same process, with bounded concurrency and automatic retries.
//!
//! ## Features
//!
//! - **FIFO dispatch** to one registered processor per queue, at most `concurrency` jobs at once
//! - **Retries with backoff**: fixed or exponential delays, per-job attempt budgets
//! - **Rate limiting**: optional minimum spacing between dispatches
//! - **Observability**: synchronous listeners, an async event stream, counters and tracing spans
//! - **Retention**: a recurring cleaner evicts old completed jobs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use attend_queue::prelude::*;
//!
//! #[derive(Clone)]
//! struct CertificateJob {
//!     attendance_id: u64,
//! }
//!
//! # async fn run() -> QueueResult<()> {
//! let queue: JobQueue<CertificateJob, String> =
//!     JobQueue::new(QueueConfig::certificate_generation())?;
//!
//! queue.register_processor(|job: JobContext<CertificateJob>| async move {
//!     job.report_progress(50).await;
//!     Ok::<_, JobError>(format!("certificate-{}.pdf", job.payload.attendance_id))
//! })?;
//!
//! let handle = queue.enqueue(CertificateJob { attendance_id: 42 }, None);
//! println!("queued job {}", handle.id());
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod execution;
pub mod maintenance;
pub mod observability;
pub mod queue;
pub(crate) mod store;
pub mod types;

pub use backoff::{compute_backoff, DEFAULT_BACKOFF_DELAY};
pub use config::{CleanPolicy, QueueConfig};
pub use error::{JobError, QueueError, QueueResult};
pub use execution::{JobContext, Processor, ProgressReporter, ProgressSink};
pub use maintenance::{Cleanable, Cleaner};
pub use observability::{BoxStream, EventListener, ListenerId, MetricsSnapshot};
pub use queue::{JobHandle, JobQueue};
pub use types::{
    Backoff, BackoffKind, JobEvent, JobId, JobOptions, JobOptionsPatch, JobRecord, JobStatus,
    QueueStats,
};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

/// Everything needed to define processors and run queues
pub mod prelude {
    pub use crate::{
        Backoff, BackoffKind, CleanPolicy, Cleaner, JobContext, JobError, JobEvent, JobHandle,
        JobId, JobOptions, JobOptionsPatch, JobQueue, JobRecord, JobStatus, Processor,
        QueueConfig, QueueError, QueueResult, QueueStats,
    };

    pub use async_trait::async_trait;
}
