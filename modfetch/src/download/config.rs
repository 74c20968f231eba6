//! Configuration for the downloader.

use std::time::Duration;

/// Default number of concurrent transfers per host.
pub const DEFAULT_THREADS_PER_HOST: usize = 4;

/// Default number of chunks a ranged transfer is split into.
pub const DEFAULT_CHUNK_COUNT: usize = 4;

/// Resources smaller than this are fetched as a single stream (1 MiB).
pub const DEFAULT_MIN_CHUNK_SIZE: u64 = 1024 * 1024;

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Concurrent transfers allowed against one host.
    pub threads_per_host: usize,

    /// Chunks per ranged transfer.
    pub chunk_count: usize,

    /// Minimum resource size for a chunked transfer.
    pub min_chunk_size: u64,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Artificial delay before each chunk starts.
    pub chunk_delay: Duration,

    /// Artificial delay before each file transfer starts.
    pub startup_delay: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            threads_per_host: DEFAULT_THREADS_PER_HOST,
            chunk_count: DEFAULT_CHUNK_COUNT,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            chunk_delay: Duration::ZERO,
            startup_delay: Duration::ZERO,
        }
    }
}

impl DownloadConfig {
    pub fn with_threads_per_host(mut self, threads: usize) -> Self {
        self.threads_per_host = threads.max(1);
        self
    }

    pub fn with_chunk_count(mut self, count: usize) -> Self {
        self.chunk_count = count.max(1);
        self
    }

    pub fn with_min_chunk_size(mut self, size: u64) -> Self {
        self.min_chunk_size = size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }
}
