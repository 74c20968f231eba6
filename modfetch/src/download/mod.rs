//! Concurrent artifact downloads.
//!
//! This module provides:
//! - A network [`Transport`] abstraction with a `reqwest` implementation
//! - Per-host concurrency limits and byte-range chunked transfers
//! - Post-download validation and collected error reporting
//! - Fractional progress events and aggregate statistics
//!
//! # Architecture
//!
//! ```text
//! Downloader::submit
//!         │
//!         ├── local path / file:// ──► copy ──────────────────┐
//!         │                                                   │
//!         └── remote ──► [host semaphore] ──► probe           │
//!                                               │             │
//!                     ┌─────────────────────────┤             │
//!                     ▼                         ▼             │
//!               single stream          chunk 1 .. chunk N     │
//!                     │                         │             │
//!                     └──► remaining -= 1 ◄─────┘             │
//!                               │ reaches zero                │
//!                               ▼                             ▼
//!                           finish: validate, count success or discard
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use modfetch::download::{DownloadConfig, DownloadRequest, Downloader};
//! use modfetch::notify::TracingNotifier;
//!
//! let downloader = Downloader::new(DownloadConfig::default(), Arc::new(TracingNotifier))?;
//! downloader.submit(DownloadRequest::new("https://example.com/a.jar", "/tmp/lib/a.jar"));
//! downloader.wait_until_done().await;
//! if downloader.error_count() > 0 {
//!     for error in downloader.take_errors() {
//!         eprintln!("{error}");
//!     }
//! }
//! ```

mod config;
mod downloader;
mod error;
mod progress;
mod stats;
mod transport;

pub use config::DownloadConfig;
pub use downloader::{DownloadRequest, Downloader, Validator};
pub use error::DownloadError;
pub use progress::TransferProgress;
pub use stats::{DownloadReport, DownloadStats};
pub use transport::{ByteRange, ByteStream, HttpTransport, RemoteResource, Transport};
