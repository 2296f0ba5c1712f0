//! Recurring retention of completed jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::{CleanPolicy, JobQueue, QueueResult};

/// A queue the cleaner can prune, independent of its payload types
pub trait Cleanable: Send + Sync {
    fn name(&self) -> &str;

    /// Evict completed jobs per the retention rule; returns the eviction count
    fn clean(&self, max_age: Duration, max_keep: usize) -> usize;
}

impl<P, R> Cleanable for JobQueue<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        JobQueue::name(self)
    }

    fn clean(&self, max_age: Duration, max_keep: usize) -> usize {
        JobQueue::clean(self, max_age, max_keep)
    }
}

/// Periodically cleans a set of queues with one retention policy
pub struct Cleaner {
    targets: Vec<Arc<dyn Cleanable>>,
    policy: CleanPolicy,
}

impl Cleaner {
    /// Create a cleaner with the default policy (hourly, 24h, keep 1000)
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            policy: CleanPolicy::default(),
        }
    }

    /// Fails on a zero interval
    pub fn with_policy(policy: CleanPolicy) -> QueueResult<Self> {
        policy.validate()?;
        Ok(Self {
            targets: Vec::new(),
            policy,
        })
    }

    pub fn add(mut self, target: impl Cleanable + 'static) -> Self {
        self.targets.push(Arc::new(target));
        self
    }

    pub fn policy(&self) -> &CleanPolicy {
        &self.policy
    }

    /// Run one clean cycle over every queue; returns the total evicted
    pub fn run_once(&self) -> usize {
        self.targets
            .iter()
            .map(|target| {
                let evicted = target.clean(self.policy.max_age, self.policy.max_keep);
                debug!("Clean cycle evicted {} jobs from '{}'", evicted, target.name());
                evicted
            })
            .sum()
    }

    /// Run clean cycles forever. The first cycle runs immediately.
    pub async fn start(self) {
        let mut ticker = interval(self.policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting cleaner for {} queues with interval: {:?}",
            self.targets.len(),
            self.policy.interval
        );

        loop {
            ticker.tick().await;
            let evicted = self.run_once();
            if evicted > 0 {
                info!("Cleaner evicted {} completed jobs", evicted);
            }
        }
    }

    /// Spawn `start` on the current runtime; abort the handle to stop it
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.start())
    }
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTarget {
        name: String,
        calls: Arc<AtomicUsize>,
        evicts: usize,
    }

    impl Cleanable for CountingTarget {
        fn name(&self) -> &str {
            &self.name
        }

        fn clean(&self, max_age: Duration, max_keep: usize) -> usize {
            assert_eq!(max_age, Duration::from_secs(24 * 3600));
            assert_eq!(max_keep, 1000);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.evicts
        }
    }

    fn target(name: &str, evicts: usize, calls: &Arc<AtomicUsize>) -> CountingTarget {
        CountingTarget {
            name: name.to_string(),
            calls: calls.clone(),
            evicts,
        }
    }

    #[test]
    fn run_once_sums_every_queue() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cleaner = Cleaner::new()
            .add(target("certificates", 3, &calls))
            .add(target("emails", 4, &calls));

        assert_eq!(cleaner.run_once(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_interval_policy_is_refused() {
        let policy = CleanPolicy {
            interval: Duration::ZERO,
            ..CleanPolicy::default()
        };
        assert!(matches!(
            Cleaner::with_policy(policy),
            Err(crate::QueueError::InvalidConfig(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_cleaner_runs_on_its_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = Cleaner::new().add(target("certificates", 0, &calls)).spawn();

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        handle.abort();
    }
}
