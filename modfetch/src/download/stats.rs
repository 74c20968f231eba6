//! Download counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared counters updated by transfer tasks.
#[derive(Debug, Default)]
pub struct DownloadStats {
    files_submitted: AtomicU64,
    files_succeeded: AtomicU64,
    files_copied: AtomicU64,
    chunks: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
}

impl DownloadStats {
    pub fn record_submitted(&self) {
        self.files_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.files_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_copy(&self) {
        self.files_copied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk(&self) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DownloadReport {
        DownloadReport {
            files_submitted: self.files_submitted.load(Ordering::Relaxed),
            files_succeeded: self.files_succeeded.load(Ordering::Relaxed),
            files_copied: self.files_copied.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`DownloadStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub files_submitted: u64,
    pub files_succeeded: u64,
    /// Files served from a local path, included in `files_succeeded`.
    pub files_copied: u64,
    /// Ranged chunk transfers completed.
    pub chunks: u64,
    pub bytes: u64,
    pub errors: u64,
}

impl DownloadReport {
    /// Format bytes as a human-readable string.
    pub fn bytes_display(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if self.bytes >= GB {
            format!("{:.2} GB", self.bytes as f64 / GB as f64)
        } else if self.bytes >= MB {
            format!("{:.2} MB", self.bytes as f64 / MB as f64)
        } else if self.bytes >= KB {
            format!("{:.2} KB", self.bytes as f64 / KB as f64)
        } else {
            format!("{} bytes", self.bytes)
        }
    }
}
