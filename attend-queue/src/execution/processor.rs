use std::future::Future;

use async_trait::async_trait;

use crate::{JobContext, JobError};

/// The unit of work registered on a queue.
///
/// One processor instance serves every concurrent invocation on its queue, so
/// it must tolerate being called up to `concurrency` times at once. Any async
/// closure `Fn(JobContext<P>) -> Future<Output = Result<R, JobError>>` is a
/// processor.
#[async_trait]
pub trait Processor<P, R>: Send + Sync + 'static {
    async fn process(&self, job: JobContext<P>) -> Result<R, JobError>;
}

#[async_trait]
impl<P, R, F, Fut> Processor<P, R> for F
where
    P: Send + 'static,
    R: Send + 'static,
    F: Fn(JobContext<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, JobError>> + Send + 'static,
{
    async fn process(&self, job: JobContext<P>) -> Result<R, JobError> {
        (self)(job).await
    }
}
