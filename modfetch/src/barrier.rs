//! Fan-out/fan-in barrier.
//!
//! Every unit of work holds a [`WorkGuard`] for its lifetime. The guard is
//! taken before the task is spawned, so a task that spawns follow-up work
//! keeps the count above zero until the follow-up has registered itself.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    outstanding: AtomicUsize,
    drained: Notify,
}

/// Counts outstanding work and wakes waiters when it drains.
#[derive(Debug, Clone, Default)]
pub struct WorkTracker {
    inner: Arc<Inner>,
}

impl WorkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one unit of work.
    pub fn register(&self) -> WorkGuard {
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
        WorkGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Resolve once no work is outstanding.
    pub async fn wait_until_done(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements the tracker on drop.
#[derive(Debug)]
pub struct WorkGuard {
    inner: Arc<Inner>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.inner.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}
