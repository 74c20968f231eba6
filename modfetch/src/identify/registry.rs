//! Per-key job deduplication.
//!
//! The first caller to [`claim`](JobRegistry::claim) a key becomes its owner.
//! Later callers either park a continuation, while the job is in progress, or
//! learn that the job is already done. The owner calls
//! [`complete`](JobRegistry::complete) and runs the returned continuations
//! after the lock has been released.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

enum JobState<W> {
    InProgress(Vec<W>),
    Done,
}

/// Outcome of claiming a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller owns the job and must complete it.
    Owner,
    /// Another caller owns the job; the continuation was parked.
    Waiting,
    /// The job already finished.
    Done,
}

pub struct JobRegistry<K, W> {
    jobs: Mutex<HashMap<K, JobState<W>>>,
}

impl<K: Eq + Hash + Clone, W> JobRegistry<K, W> {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Claim `key`. `continuation` is only invoked when the job is in
    /// progress under another owner.
    pub fn claim(&self, key: &K, continuation: impl FnOnce() -> W) -> Claim {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(key) {
            None => {
                jobs.insert(key.clone(), JobState::InProgress(Vec::new()));
                Claim::Owner
            }
            Some(JobState::InProgress(waiters)) => {
                waiters.push(continuation());
                Claim::Waiting
            }
            Some(JobState::Done) => Claim::Done,
        }
    }

    /// Mark `key` done and return its parked continuations.
    pub fn complete(&self, key: &K) -> Vec<W> {
        let mut jobs = self.jobs.lock();
        match jobs.insert(key.clone(), JobState::Done) {
            Some(JobState::InProgress(waiters)) => waiters,
            _ => Vec::new(),
        }
    }

    /// Forget every job, finished or not. Parked continuations are dropped.
    pub fn clear(&self) {
        self.jobs.lock().clear();
    }
}

impl<K: Eq + Hash + Clone, W> Default for JobRegistry<K, W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_lifecycle() {
        let registry: JobRegistry<&str, u32> = JobRegistry::new();

        assert_eq!(registry.claim(&"a", || 1), Claim::Owner);
        assert_eq!(registry.claim(&"a", || 2), Claim::Waiting);
        assert_eq!(registry.claim(&"a", || 3), Claim::Waiting);
        assert_eq!(registry.claim(&"b", || 4), Claim::Owner);

        assert_eq!(registry.complete(&"a"), vec![2, 3]);
        assert_eq!(registry.claim(&"a", || 5), Claim::Done);
        assert_eq!(registry.claim(&"b", || 6), Claim::Waiting);
        assert!(registry.complete(&"a").is_empty());
    }

    #[test]
    fn test_clear_forgets_finished_jobs() {
        let registry: JobRegistry<&str, u32> = JobRegistry::new();
        registry.claim(&"a", || 1);
        registry.complete(&"a");
        assert_eq!(registry.claim(&"a", || 2), Claim::Done);

        registry.clear();

        assert_eq!(registry.claim(&"a", || 3), Claim::Owner);
    }

    #[test]
    fn test_single_owner_under_contention() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let registry: Arc<JobRegistry<u32, usize>> = Arc::new(JobRegistry::new());
        let owners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let owners = Arc::clone(&owners);
                std::thread::spawn(move || {
                    if registry.claim(&7, || i) == Claim::Owner {
                        owners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(owners.load(Ordering::SeqCst), 1);
        assert_eq!(registry.complete(&7).len(), 7);
    }
}
