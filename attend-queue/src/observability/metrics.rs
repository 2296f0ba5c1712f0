use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters for one queue
#[derive(Debug, Default)]
pub struct QueueMetrics {
    jobs_enqueued: AtomicU64,
    jobs_dispatched: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_evicted: AtomicU64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_jobs_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_dispatched(&self) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_retried(&self) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_jobs_evicted(&self, count: u64) {
        self.jobs_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_retried: self.jobs_retried.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_evicted: self.jobs_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_enqueued: u64,
    pub jobs_dispatched: u64,
    pub jobs_completed: u64,
    pub jobs_retried: u64,
    pub jobs_failed: u64,
    pub jobs_evicted: u64,
}

impl MetricsSnapshot {
    /// Share of finished jobs that completed, 1.0 when nothing has finished
    pub fn success_rate(&self) -> f64 {
        let finished = self.jobs_completed + self.jobs_failed;
        if finished == 0 {
            1.0
        } else {
            self.jobs_completed as f64 / finished as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = QueueMetrics::new();
        metrics.increment_jobs_enqueued();
        metrics.increment_jobs_enqueued();
        metrics.increment_jobs_completed();
        metrics.increment_jobs_failed();
        metrics.add_jobs_evicted(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_enqueued, 2);
        assert_eq!(snapshot.jobs_evicted, 3);
        assert_eq!(snapshot.success_rate(), 0.5);
    }
}
