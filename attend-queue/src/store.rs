use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::backoff::compute_backoff;
use crate::{JobId, JobOptions, JobRecord, JobStatus, QueueError, QueueResult, QueueStats};

/// A job handed to a worker
#[derive(Debug, Clone)]
pub(crate) struct Dispatch<P> {
    pub id: JobId,
    pub payload: P,
    pub attempt: u32,
}

/// What the store decided after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureOutcome {
    /// Job is waiting; re-append it after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Attempt budget spent; job is in the failed set
    Failed { attempt: u32 },
}

/// In-memory job storage: every record plus the indexes that back queries.
///
/// A live job id is in at most one of `pending`, `active`, `waiting`,
/// `completed` and `failed`, matching its record's status.
pub(crate) struct JobStore<P, R> {
    /// Job records indexed by id
    jobs: HashMap<JobId, JobRecord<P, R>>,

    /// FIFO dispatch order
    pending: VecDeque<JobId>,

    active: HashSet<JobId>,

    /// Failed attempts sitting out their backoff delay
    waiting: HashSet<JobId>,

    completed: HashSet<JobId>,

    failed: HashSet<JobId>,

    next_id: JobId,
}

impl<P: Clone, R: Clone> JobStore<P, R> {
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            pending: VecDeque::new(),
            active: HashSet::new(),
            waiting: HashSet::new(),
            completed: HashSet::new(),
            failed: HashSet::new(),
            next_id: JobId::FIRST,
        }
    }

    /// Create a pending record at the tail of the pending sequence
    pub fn insert(&mut self, payload: P, options: JobOptions) -> JobId {
        let id = self.next_id;
        self.next_id = id.next();

        self.jobs.insert(id, JobRecord::new(id, payload, options));
        self.pending.push_back(id);
        id
    }

    /// Pop the head of the pending sequence and mark it active
    pub fn take_next(&mut self, now: DateTime<Utc>) -> Option<Dispatch<P>> {
        while let Some(id) = self.pending.pop_front() {
            let Some(record) = self.jobs.get_mut(&id) else {
                continue;
            };

            record.start_attempt(now);
            self.active.insert(id);

            return Some(Dispatch {
                id,
                payload: record.payload.clone(),
                attempt: record.attempts,
            });
        }
        None
    }

    /// Move an active job to the completed set
    pub fn complete(&mut self, id: JobId, result: R, now: DateTime<Utc>) -> bool {
        if !self.active.remove(&id) {
            return false;
        }
        match self.jobs.get_mut(&id) {
            Some(record) => {
                record.complete(result, now);
                self.completed.insert(id);
                true
            }
            None => false,
        }
    }

    /// Record a failed attempt and decide between retry and permanent failure
    pub fn record_failure(&mut self, id: JobId, error: String, now: DateTime<Utc>) -> Option<FailureOutcome> {
        if !self.active.remove(&id) {
            return None;
        }
        let record = self.jobs.get_mut(&id)?;
        let attempt = record.attempts;

        if record.can_retry() {
            let delay = compute_backoff(&record.options.backoff, attempt);
            record.wait_for_retry(error);
            self.waiting.insert(id);
            Some(FailureOutcome::Retry { attempt, delay })
        } else {
            record.fail(error, now);
            self.failed.insert(id);
            Some(FailureOutcome::Failed { attempt })
        }
    }

    /// Re-append a waiting job to the tail of the pending sequence
    pub fn requeue(&mut self, id: JobId) -> bool {
        if !self.waiting.remove(&id) {
            return false;
        }
        match self.jobs.get_mut(&id) {
            Some(record) => {
                record.status = JobStatus::Pending;
                self.pending.push_back(id);
                true
            }
            None => false,
        }
    }

    /// Move a permanently failed job back to the pending tail with a fresh budget
    pub fn retry_failed(&mut self, id: JobId) -> QueueResult<()> {
        let record = self.jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;
        if record.status != JobStatus::Failed {
            return Err(QueueError::NotFailed(id));
        }

        record.reset_for_retry();
        self.failed.remove(&id);
        self.pending.push_back(id);
        Ok(())
    }

    /// Ids of every permanently failed job, oldest failure first
    pub fn failed_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.failed.iter().copied().collect();
        ids.sort_by_key(|id| (self.jobs.get(id).and_then(|r| r.failed_at), *id));
        ids
    }

    /// Store caller-reported progress, clamped to 100
    pub fn set_progress(&mut self, id: JobId, progress: u8) -> Option<u8> {
        let record = self.jobs.get_mut(&id)?;
        record.progress = progress.min(100);
        Some(record.progress)
    }

    pub fn get(&self, id: JobId) -> Option<&JobRecord<P, R>> {
        self.jobs.get(&id)
    }

    pub fn list_pending(&self) -> Vec<JobRecord<P, R>> {
        self.pending.iter().filter_map(|id| self.jobs.get(id)).cloned().collect()
    }

    pub fn list_active(&self) -> Vec<JobRecord<P, R>> {
        self.snapshot(&self.active)
    }

    pub fn list_waiting(&self) -> Vec<JobRecord<P, R>> {
        self.snapshot(&self.waiting)
    }

    pub fn list_completed(&self) -> Vec<JobRecord<P, R>> {
        self.snapshot(&self.completed)
    }

    pub fn list_failed(&self) -> Vec<JobRecord<P, R>> {
        self.snapshot(&self.failed)
    }

    fn snapshot(&self, ids: &HashSet<JobId>) -> Vec<JobRecord<P, R>> {
        ids.iter().filter_map(|id| self.jobs.get(id)).cloned().collect()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.len(),
            active: self.active.len(),
            waiting: self.waiting.len(),
            completed: self.completed.len(),
            failed: self.failed.len(),
            total: self.jobs.len(),
        }
    }

    /// Evict old completed jobs.
    ///
    /// Completed jobs are ranked by completion time, newest first. The first
    /// `max_keep` are always kept; any job past that rank is evicted when it
    /// completed more than `max_age` before `now`. Returns the evicted ids.
    pub fn clean(&mut self, now: DateTime<Utc>, max_age: Duration, max_keep: usize) -> Vec<JobId> {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            // Longer than chrono can represent: nothing is old enough.
            return Vec::new();
        };

        let mut ranked: Vec<(DateTime<Utc>, JobId)> = self
            .completed
            .iter()
            .filter_map(|id| {
                let completed_at = self.jobs.get(id)?.completed_at?;
                Some((completed_at, *id))
            })
            .collect();
        ranked.sort_unstable_by(|a, b| b.cmp(a));

        let evicted: Vec<JobId> = ranked
            .into_iter()
            .skip(max_keep)
            .filter(|(completed_at, _)| now.signed_duration_since(*completed_at) > max_age)
            .map(|(_, id)| id)
            .collect();

        for id in &evicted {
            self.completed.remove(id);
            self.jobs.remove(id);
        }
        evicted
    }

    /// Stamp a completion time directly (test helper)
    #[cfg(test)]
    pub fn backdate_completion(&mut self, id: JobId, completed_at: DateTime<Utc>) {
        if let Some(record) = self.jobs.get_mut(&id) {
            record.completed_at = Some(completed_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Backoff;
    use proptest::prelude::*;

    type Store = JobStore<u32, String>;

    fn options(max_attempts: u32) -> JobOptions {
        JobOptions::new(max_attempts, Backoff::exponential(Duration::from_millis(2000)))
    }

    fn complete_n(store: &mut Store, n: u32) -> Vec<JobId> {
        let now = Utc::now();
        (0..n)
            .map(|i| {
                let id = store.insert(i, options(1));
                let job = store.take_next(now).unwrap();
                assert_eq!(job.id, id);
                store.complete(id, format!("cert-{}", i), now);
                id
            })
            .collect()
    }

    /// Give job i a completion time i minutes after `base`
    fn spread_completions(store: &mut Store, ids: &[JobId], base: DateTime<Utc>) {
        for (i, id) in ids.iter().enumerate() {
            store.backdate_completion(*id, base + chrono::Duration::minutes(i as i64));
        }
    }

    #[test]
    fn ids_are_monotonic_and_pending_is_fifo() {
        let mut store = Store::new();
        let a = store.insert(10, options(3));
        let b = store.insert(20, options(3));
        let c = store.insert(30, options(3));
        assert!(a < b && b < c);

        let order: Vec<u32> = store.list_pending().into_iter().map(|r| r.payload).collect();
        assert_eq!(order, vec![10, 20, 30]);

        assert_eq!(store.take_next(Utc::now()).unwrap().id, a);
        assert_eq!(store.take_next(Utc::now()).unwrap().id, b);
    }

    #[test]
    fn ids_are_not_reused_after_eviction() {
        let mut store = Store::new();
        let ids = complete_n(&mut store, 3);
        store.clean(Utc::now() + chrono::Duration::hours(1), Duration::ZERO, 0);
        assert_eq!(store.stats().total, 0);

        let next = store.insert(99, options(1));
        assert!(next > ids[2]);
    }

    #[test]
    fn dispatch_moves_job_from_pending_to_active() {
        let mut store = Store::new();
        let id = store.insert(1, options(3));

        let job = store.take_next(Utc::now()).unwrap();
        assert_eq!(job.attempt, 1);

        let stats = store.stats();
        assert_eq!((stats.pending, stats.active), (0, 1));
        assert_eq!(store.get(id).unwrap().status, JobStatus::Active);
        assert!(store.take_next(Utc::now()).is_none());
    }

    #[test]
    fn failures_retry_until_budget_is_spent() {
        let mut store = Store::new();
        let id = store.insert(1, options(3));

        store.take_next(Utc::now());
        let outcome = store.record_failure(id, "smtp timeout".into(), Utc::now());
        assert_eq!(
            outcome,
            Some(FailureOutcome::Retry { attempt: 1, delay: Duration::from_millis(2000) })
        );
        assert_eq!(store.get(id).unwrap().status, JobStatus::Waiting);
        assert_eq!(store.stats().waiting, 1);

        assert!(store.requeue(id));
        store.take_next(Utc::now());
        let outcome = store.record_failure(id, "smtp timeout".into(), Utc::now());
        assert_eq!(
            outcome,
            Some(FailureOutcome::Retry { attempt: 2, delay: Duration::from_millis(4000) })
        );

        assert!(store.requeue(id));
        store.take_next(Utc::now());
        let outcome = store.record_failure(id, "smtp timeout".into(), Utc::now());
        assert_eq!(outcome, Some(FailureOutcome::Failed { attempt: 3 }));

        let record = store.get(id).unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.attempts, 3);
        assert!(record.failed_at.is_some());
        assert_eq!(record.error.as_deref(), Some("smtp timeout"));
        assert_eq!(store.stats().failed, 1);
    }

    #[test]
    fn retried_jobs_rejoin_at_the_tail() {
        let mut store = Store::new();
        let first = store.insert(1, options(2));
        store.take_next(Utc::now());
        store.record_failure(first, "boom".into(), Utc::now());

        let second = store.insert(2, options(2));
        store.requeue(first);

        let order: Vec<JobId> = store.list_pending().into_iter().map(|r| r.id).collect();
        assert_eq!(order, vec![second, first]);
    }

    #[test]
    fn requeue_ignores_jobs_that_are_not_waiting() {
        let mut store = Store::new();
        let id = store.insert(1, options(2));
        assert!(!store.requeue(id));
        assert_eq!(store.stats().pending, 1);
    }

    #[test]
    fn retry_failed_resets_the_budget() {
        let mut store = Store::new();
        let id = store.insert(1, options(1));
        store.take_next(Utc::now());
        store.record_failure(id, "template missing".into(), Utc::now());

        store.retry_failed(id).unwrap();
        let record = store.get(id).unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.attempts, 0);
        assert!(record.failed_at.is_none());
        assert_eq!(store.stats().failed, 0);
        assert_eq!(store.stats().pending, 1);

        assert_eq!(store.retry_failed(id), Err(QueueError::NotFailed(id)));
        assert_eq!(store.retry_failed(JobId(404)), Err(QueueError::JobNotFound(JobId(404))));
    }

    #[test]
    fn progress_is_clamped() {
        let mut store = Store::new();
        let id = store.insert(1, options(1));
        assert_eq!(store.set_progress(id, 250), Some(100));
        assert_eq!(store.set_progress(JobId(77), 10), None);
    }

    #[test]
    fn clean_keeps_the_most_recent_regardless_of_age() {
        let mut store = Store::new();
        let ids = complete_n(&mut store, 150);
        let base = Utc::now() - chrono::Duration::days(30);
        spread_completions(&mut store, &ids, base);

        let evicted = store.clean(Utc::now(), Duration::ZERO, 100);
        assert_eq!(evicted.len(), 50);

        let mut kept: Vec<JobId> = store.list_completed().into_iter().map(|r| r.id).collect();
        kept.sort();
        assert_eq!(kept, ids[50..].to_vec());
    }

    #[test]
    fn clean_only_evicts_jobs_older_than_max_age() {
        let mut store = Store::new();
        let ids = complete_n(&mut store, 4);
        let now = Utc::now();
        store.backdate_completion(ids[0], now - chrono::Duration::hours(48));
        store.backdate_completion(ids[1], now - chrono::Duration::hours(30));
        store.backdate_completion(ids[2], now - chrono::Duration::hours(2));
        store.backdate_completion(ids[3], now - chrono::Duration::hours(1));

        let evicted = store.clean(now, Duration::from_secs(24 * 3600), 1);
        assert_eq!(evicted.len(), 2);
        assert!(store.get(ids[0]).is_none());
        assert!(store.get(ids[1]).is_none());
        assert!(store.get(ids[2]).is_some());
    }

    #[test]
    fn clean_never_touches_failed_or_pending_jobs() {
        let mut store = Store::new();
        let failed = store.insert(1, options(1));
        store.take_next(Utc::now());
        store.record_failure(failed, "boom".into(), Utc::now());
        let pending = store.insert(2, options(1));

        let later = Utc::now() + chrono::Duration::days(365);
        assert!(store.clean(later, Duration::ZERO, 0).is_empty());
        assert!(store.get(failed).is_some());
        assert!(store.get(pending).is_some());
    }

    proptest! {
        #[test]
        fn clean_is_idempotent(n in 0u32..60, max_keep in 0usize..80, max_age_min in 0u64..120) {
            let mut store = Store::new();
            let ids = complete_n(&mut store, n);
            spread_completions(&mut store, &ids, Utc::now() - chrono::Duration::hours(2));

            let now = Utc::now();
            let max_age = Duration::from_secs(max_age_min * 60);
            store.clean(now, max_age, max_keep);
            let after_first = store.stats();

            let second = store.clean(now, max_age, max_keep);
            prop_assert!(second.is_empty());
            prop_assert_eq!(store.stats(), after_first);
            prop_assert!(after_first.completed >= max_keep.min(n as usize));
        }
    }
}
