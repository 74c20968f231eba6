//! Event sink for user-facing progress and diagnostics.
//!
//! The engine reports what it is doing through a [`Notifier`] passed in
//! explicitly. Long-running operations are bracketed by `begin` and `end`
//! (or `fail`) sharing an [`EventId`]; `update` reports fractional progress
//! in between.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, info, warn};

/// Correlation id tying the events of one operation together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

impl EventId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receiver of engine events. Every method defaults to a no-op.
pub trait Notifier: Send + Sync {
    fn begin(&self, _id: EventId, _message: &str) {}

    /// `fraction` is clamped to `[0, 1]` by callers.
    fn update(&self, _id: EventId, _fraction: f64) {}

    fn end(&self, _id: EventId, _message: &str) {}

    fn fail(&self, _id: EventId, _message: &str) {}

    fn info(&self, _message: &str) {}

    fn error(&self, _message: &str) {}

    fn debug(&self, _message: &str) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {}

/// Routes events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn begin(&self, id: EventId, message: &str) {
        info!(event = id.value(), "{}", message);
    }

    fn update(&self, id: EventId, fraction: f64) {
        debug!(event = id.value(), percent = format!("{:.0}", fraction * 100.0), "Progress");
    }

    fn end(&self, id: EventId, message: &str) {
        info!(event = id.value(), "{}", message);
    }

    fn fail(&self, id: EventId, message: &str) {
        warn!(event = id.value(), "{}", message);
    }

    fn info(&self, message: &str) {
        info!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }

    fn debug(&self, message: &str) {
        debug!("{}", message);
    }
}
