//! Progress tracking for a single transfer.
//!
//! Chunks of one file share a [`TransferProgress`] and add to it as bytes
//! arrive. An update is only emitted when the completed percentage grows, so
//! notifiers are not flooded by small reads.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct TransferProgress {
    total: Option<u64>,
    done: AtomicU64,
    last_percent: AtomicU64,
}

impl TransferProgress {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            done: AtomicU64::new(0),
            last_percent: AtomicU64::new(0),
        }
    }

    /// Bytes transferred so far across all chunks.
    pub fn bytes_done(&self) -> u64 {
        self.done.load(Ordering::SeqCst)
    }

    /// Record `bytes` more and return the new fraction if it crossed a whole
    /// percentage point. Transfers of unknown size never report.
    pub fn advance(&self, bytes: u64) -> Option<f64> {
        let done = self.done.fetch_add(bytes, Ordering::SeqCst) + bytes;
        let total = self.total?;
        let fraction = (done as f64 / total as f64).clamp(0.0, 1.0);
        let percent = (fraction * 100.0) as u64;

        let previous = self.last_percent.fetch_max(percent, Ordering::SeqCst);
        (percent > previous).then_some(fraction)
    }
}
