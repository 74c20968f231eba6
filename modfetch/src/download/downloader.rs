//! Concurrent downloader.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Url;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::config::DownloadConfig;
use super::error::DownloadError;
use super::progress::TransferProgress;
use super::stats::{DownloadReport, DownloadStats};
use super::transport::{ByteRange, HttpTransport, Transport};
use crate::barrier::WorkTracker;
use crate::notify::{EventId, Notifier};
use crate::BoxFuture;

/// Checks a downloaded file once all of its bytes are on disk.
pub trait Validator: Send + Sync {
    fn validate<'a>(&'a self, file: &'a Path) -> BoxFuture<'a, Result<(), String>>;
}

/// One file to fetch.
#[derive(Clone)]
pub struct DownloadRequest {
    /// URL, `file://` URL or local path.
    pub source: String,
    pub destination: PathBuf,
    pub validator: Option<Arc<dyn Validator>>,
}

impl DownloadRequest {
    pub fn new(source: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }
}

impl std::fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("validated", &self.validator.is_some())
            .finish()
    }
}

/// Where a locator points.
enum Origin {
    Local(PathBuf),
    Remote { url: String, host: String },
}

fn classify(locator: &str) -> Result<Origin, DownloadError> {
    if !locator.contains("://") {
        return Ok(Origin::Local(PathBuf::from(locator)));
    }
    let invalid = |reason: String| DownloadError::InvalidLocator {
        locator: locator.to_string(),
        reason,
    };
    let url = Url::parse(locator).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() == "file" {
        let path = url
            .to_file_path()
            .map_err(|_| invalid("not a local file path".to_string()))?;
        return Ok(Origin::Local(path));
    }
    let host = url
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?
        .to_string();
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    };
    Ok(Origin::Remote {
        url: url.to_string(),
        host,
    })
}

/// State shared by the chunks of one file.
struct FileTransfer {
    url: String,
    destination: PathBuf,
    validator: Option<Arc<dyn Validator>>,
    event: EventId,
    remaining: AtomicUsize,
    failed: AtomicBool,
    progress: TransferProgress,
}

struct DownloaderInner {
    config: DownloadConfig,
    transport: Arc<dyn Transport>,
    hosts: DashMap<String, Arc<Semaphore>>,
    tracker: WorkTracker,
    errors: Mutex<Vec<DownloadError>>,
    stats: DownloadStats,
    notifier: Arc<dyn Notifier>,
}

/// Fetches files concurrently, bounded per source host.
///
/// Submissions return immediately. Call [`wait_until_done`](Self::wait_until_done)
/// and then inspect [`error_count`](Self::error_count); errors are collected,
/// never propagated across tasks.
#[derive(Clone)]
pub struct Downloader {
    inner: Arc<DownloaderInner>,
}

impl Downloader {
    /// Create a downloader using the HTTP transport.
    pub fn new(config: DownloadConfig, notifier: Arc<dyn Notifier>) -> Result<Self, DownloadError> {
        let transport = HttpTransport::new(config.timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport), notifier))
    }

    pub fn with_transport(
        config: DownloadConfig,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(DownloaderInner {
                config,
                transport,
                hosts: DashMap::new(),
                tracker: WorkTracker::new(),
                errors: Mutex::new(Vec::new()),
                stats: DownloadStats::default(),
                notifier,
            }),
        }
    }

    /// Schedule a transfer. Must be called from within a tokio runtime.
    ///
    /// The destination's parent directories are created by the scheduled
    /// task before any bytes are fetched.
    pub fn submit(&self, request: DownloadRequest) {
        let inner = &self.inner;
        inner.stats.record_submitted();

        let origin = match classify(&request.source) {
            Ok(origin) => origin,
            Err(e) => {
                inner.record_error(e);
                return;
            }
        };

        let guard = inner.tracker.register();
        let task_inner = Arc::clone(inner);
        tokio::spawn(async move {
            let _guard = guard;
            if let Some(parent) = request.destination.parent() {
                if let Err(e) = fs::create_dir_all(parent).await {
                    task_inner.record_error(DownloadError::CreateDirFailed {
                        path: parent.to_path_buf(),
                        source: e,
                    });
                    return;
                }
            }
            match origin {
                Origin::Local(path) => task_inner.copy_local(path, request).await,
                Origin::Remote { url, host } => {
                    let permits = task_inner.host_permits(&host);
                    task_inner.transfer(url, permits, request).await;
                }
            }
        });
    }

    /// Resolve once every submitted transfer, including its chunks, has
    /// finished.
    pub async fn wait_until_done(&self) {
        self.inner.tracker.wait_until_done().await;
    }

    pub fn error_count(&self) -> usize {
        self.inner.errors.lock().len()
    }

    /// Take the collected errors, leaving none behind.
    pub fn take_errors(&self) -> Vec<DownloadError> {
        std::mem::take(&mut *self.inner.errors.lock())
    }

    pub fn report(&self) -> DownloadReport {
        self.inner.stats.snapshot()
    }
}

impl DownloaderInner {
    fn host_permits(&self, host: &str) -> Arc<Semaphore> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.threads_per_host.max(1))))
            .clone()
    }

    fn record_error(&self, error: DownloadError) {
        warn!(subject = %error.subject(), error = %error, "Download error");
        self.stats.record_error();
        self.errors.lock().push(error);
    }

    async fn copy_local(&self, path: PathBuf, request: DownloadRequest) {
        let event = EventId::next();
        self.notifier
            .begin(event, &format!("Copying {}", path.display()));

        match fs::copy(&path, &request.destination).await {
            Ok(bytes) => {
                self.stats.record_bytes(bytes);
                self.stats.record_copy();
                let transfer = FileTransfer {
                    url: request.source,
                    destination: request.destination,
                    validator: request.validator,
                    event,
                    remaining: AtomicUsize::new(1),
                    failed: AtomicBool::new(false),
                    progress: TransferProgress::new(Some(bytes)),
                };
                self.finish(&transfer).await;
            }
            Err(e) => {
                self.notifier.fail(event, &format!("Failed to copy {}", path.display()));
                self.record_error(DownloadError::CopyFailed {
                    from: path,
                    to: request.destination,
                    source: e,
                });
            }
        }
    }

    async fn transfer(self: &Arc<Self>, url: String, permits: Arc<Semaphore>, request: DownloadRequest) {
        if !self.config.startup_delay.is_zero() {
            tokio::time::sleep(self.config.startup_delay).await;
        }

        let event = EventId::next();
        self.notifier.begin(event, &format!("Downloading {url}"));

        let resource = {
            let Ok(_permit) = permits.acquire().await else {
                return;
            };
            match self.transport.probe(&url).await {
                Ok(resource) => resource,
                Err(e) => {
                    self.notifier.fail(event, &format!("Failed to download {url}"));
                    self.record_error(e);
                    return;
                }
            }
        };

        let ranges = match resource.size {
            Some(size)
                if resource.accepts_ranges
                    && self.config.chunk_count > 1
                    && size >= self.config.min_chunk_size =>
            {
                ByteRange::split(size, self.config.chunk_count)
            }
            _ => Vec::new(),
        };

        let transfer = Arc::new(FileTransfer {
            url,
            destination: request.destination,
            validator: request.validator,
            event,
            remaining: AtomicUsize::new(ranges.len().max(1)),
            failed: AtomicBool::new(false),
            progress: TransferProgress::new(resource.size),
        });

        if ranges.len() < 2 {
            let Ok(_permit) = permits.acquire().await else {
                return;
            };
            if let Err(e) = self.stream_whole(&transfer, resource.size).await {
                transfer.failed.store(true, Ordering::SeqCst);
                self.record_error(e);
            }
            self.chunk_done(&transfer).await;
            return;
        }

        if let Err(e) = presize(&transfer.destination, resource.size.unwrap_or(0)).await {
            self.notifier.fail(event, &format!("Failed to download {}", transfer.url));
            self.record_error(e);
            return;
        }

        debug!(url = %transfer.url, chunks = ranges.len(), "Starting chunked transfer");
        for range in ranges {
            let guard = self.tracker.register();
            let inner = Arc::clone(self);
            let transfer = Arc::clone(&transfer);
            let permits = Arc::clone(&permits);
            tokio::spawn(async move {
                let _guard = guard;
                let Ok(_permit) = permits.acquire().await else {
                    return;
                };
                if !inner.config.chunk_delay.is_zero() {
                    tokio::time::sleep(inner.config.chunk_delay).await;
                }
                match inner.stream_range(&transfer, range).await {
                    Ok(()) => inner.stats.record_chunk(),
                    Err(e) => {
                        transfer.failed.store(true, Ordering::SeqCst);
                        inner.record_error(e);
                    }
                }
                inner.chunk_done(&transfer).await;
            });
        }
    }

    /// Stream the whole resource. When the probe reported a size the body
    /// must match it.
    async fn stream_whole(&self, transfer: &FileTransfer, expected: Option<u64>) -> Result<(), DownloadError> {
        let write_failed = |e| DownloadError::WriteFailed {
            path: transfer.destination.clone(),
            source: e,
        };
        let mut file = fs::File::create(&transfer.destination)
            .await
            .map_err(write_failed)?;
        let written = self.copy_stream(transfer, None, &mut file).await?;
        file.flush().await.map_err(write_failed)?;

        match expected {
            Some(expected) if written != expected => Err(DownloadError::Incomplete {
                url: transfer.url.clone(),
                expected,
                actual: written,
            }),
            _ => Ok(()),
        }
    }

    async fn stream_range(&self, transfer: &FileTransfer, range: ByteRange) -> Result<(), DownloadError> {
        let write_failed = |e| DownloadError::WriteFailed {
            path: transfer.destination.clone(),
            source: e,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .open(&transfer.destination)
            .await
            .map_err(write_failed)?;
        file.seek(SeekFrom::Start(range.start))
            .await
            .map_err(write_failed)?;

        let written = self.copy_stream(transfer, Some(range), &mut file).await?;
        file.flush().await.map_err(write_failed)?;

        if written != range.len() {
            return Err(DownloadError::Incomplete {
                url: transfer.url.clone(),
                expected: range.len(),
                actual: written,
            });
        }
        Ok(())
    }

    async fn copy_stream(
        &self,
        transfer: &FileTransfer,
        range: Option<ByteRange>,
        file: &mut fs::File,
    ) -> Result<u64, DownloadError> {
        let mut body = self.transport.fetch(&transfer.url, range).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let bytes = chunk?;
            if let Some(range) = range {
                if written + bytes.len() as u64 > range.len() {
                    return Err(DownloadError::Incomplete {
                        url: transfer.url.clone(),
                        expected: range.len(),
                        actual: written + bytes.len() as u64,
                    });
                }
            }
            file.write_all(&bytes)
                .await
                .map_err(|e| DownloadError::WriteFailed {
                    path: transfer.destination.clone(),
                    source: e,
                })?;
            written += bytes.len() as u64;
            self.stats.record_bytes(bytes.len() as u64);
            if let Some(fraction) = transfer.progress.advance(bytes.len() as u64) {
                self.notifier.update(transfer.event, fraction);
            }
        }
        Ok(written)
    }

    /// Count down one chunk. The chunk that reaches zero finishes the file.
    async fn chunk_done(&self, transfer: &FileTransfer) {
        if transfer.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finish(transfer).await;
        }
    }

    async fn finish(&self, transfer: &FileTransfer) {
        if transfer.failed.load(Ordering::SeqCst) {
            discard(&transfer.destination).await;
            self.notifier
                .fail(transfer.event, &format!("Failed to download {}", transfer.url));
            return;
        }

        if let Some(validator) = &transfer.validator {
            if let Err(reason) = validator.validate(&transfer.destination).await {
                discard(&transfer.destination).await;
                self.notifier
                    .fail(transfer.event, &format!("Invalid file {}", transfer.destination.display()));
                self.record_error(DownloadError::ValidationFailed {
                    path: transfer.destination.clone(),
                    reason,
                });
                return;
            }
        }

        self.stats.record_success();
        info!(
            source = %transfer.url,
            destination = %transfer.destination.display(),
            bytes = transfer.progress.bytes_done(),
            "Download complete"
        );
        self.notifier.end(
            transfer.event,
            &format!("Installed {}", transfer.destination.display()),
        );
    }
}

async fn presize(path: &Path, size: u64) -> Result<(), DownloadError> {
    let write_failed = |e| DownloadError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let file = fs::File::create(path).await.map_err(write_failed)?;
    file.set_len(size).await.map_err(write_failed)
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove incomplete file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullNotifier;
    use crate::testing::{MemoryTransport, RecordingNotifier};
    use rand::RngCore;
    use std::time::Duration;
    use tempfile::TempDir;

    fn payload(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::rng().fill_bytes(&mut data);
        data
    }

    fn downloader(transport: Arc<MemoryTransport>, config: DownloadConfig) -> Downloader {
        Downloader::with_transport(config, transport, Arc::new(NullNotifier))
    }

    struct RejectAll;

    impl Validator for RejectAll {
        fn validate<'a>(&'a self, _file: &'a Path) -> BoxFuture<'a, Result<(), String>> {
            Box::pin(async { Err("rejected".to_string()) })
        }
    }

    struct CountingValidator(AtomicUsize);

    impl Validator for CountingValidator {
        fn validate<'a>(&'a self, _file: &'a Path) -> BoxFuture<'a, Result<(), String>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn test_classify_locators() {
        assert!(matches!(classify("/srv/a.jar"), Ok(Origin::Local(_))));
        assert!(matches!(classify("file:///srv/a.jar"), Ok(Origin::Local(p)) if p == Path::new("/srv/a.jar")));
        match classify("https://repo.example.com:8443/a.jar") {
            Ok(Origin::Remote { host, .. }) => assert_eq!(host, "repo.example.com:8443"),
            _ => panic!("expected remote origin"),
        }
        assert!(classify("http://").is_err());
    }

    #[tokio::test]
    async fn test_chunked_equals_single_stream() {
        let temp = TempDir::new().unwrap();
        let data = payload(64 * 1024 + 7);
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("http://host/a.bin", data.clone(), true);

        let validator = Arc::new(CountingValidator(AtomicUsize::new(0)));
        let chunked = downloader(
            transport.clone(),
            DownloadConfig::default().with_chunk_count(4).with_min_chunk_size(1024),
        );
        chunked.submit(
            DownloadRequest::new("http://host/a.bin", temp.path().join("chunked/a.bin"))
                .with_validator(validator.clone()),
        );
        chunked.wait_until_done().await;

        let single = downloader(transport.clone(), DownloadConfig::default().with_chunk_count(1));
        single.submit(DownloadRequest::new("http://host/a.bin", temp.path().join("single/a.bin")));
        single.wait_until_done().await;

        assert_eq!(chunked.error_count(), 0);
        assert_eq!(single.error_count(), 0);
        let a = std::fs::read(temp.path().join("chunked/a.bin")).unwrap();
        let b = std::fs::read(temp.path().join("single/a.bin")).unwrap();
        assert_eq!(a, data);
        assert_eq!(a, b);

        assert_eq!(validator.0.load(Ordering::SeqCst), 1);
        let report = chunked.report();
        assert_eq!(report.chunks, 4);
        assert_eq!(report.files_succeeded, 1);
        assert_eq!(report.bytes, data.len() as u64);
    }

    #[tokio::test]
    async fn test_small_resource_is_not_chunked() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("http://host/small", b"tiny".to_vec(), true);

        let downloader = downloader(transport, DownloadConfig::default());
        downloader.submit(DownloadRequest::new("http://host/small", temp.path().join("small")));
        downloader.wait_until_done().await;

        assert_eq!(downloader.report().chunks, 0);
        assert_eq!(std::fs::read(temp.path().join("small")).unwrap(), b"tiny");
    }

    #[tokio::test]
    async fn test_failed_chunk_discards_file() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("http://host/big", payload(8192), true);
        transport.fail_range_starting_at("http://host/big", 2048);

        let downloader = downloader(
            transport,
            DownloadConfig::default().with_chunk_count(4).with_min_chunk_size(1024),
        );
        downloader.submit(DownloadRequest::new("http://host/big", temp.path().join("big")));
        downloader.wait_until_done().await;

        assert_eq!(downloader.error_count(), 1);
        assert_eq!(downloader.report().files_succeeded, 0);
        assert!(!temp.path().join("big").exists());
    }

    #[tokio::test]
    async fn test_validation_failure_deletes_file() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("http://host/x", b"content".to_vec(), false);

        let downloader = downloader(transport, DownloadConfig::default());
        downloader.submit(
            DownloadRequest::new("http://host/x", temp.path().join("x")).with_validator(Arc::new(RejectAll)),
        );
        downloader.wait_until_done().await;

        let errors = downloader.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], DownloadError::ValidationFailed { .. }));
        assert!(!temp.path().join("x").exists());
        assert_eq!(downloader.error_count(), 0);
    }

    #[tokio::test]
    async fn test_local_copy_bypasses_transport() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.txt");
        std::fs::write(&source, b"local bytes").unwrap();
        let transport = Arc::new(MemoryTransport::new());

        let downloader = downloader(transport.clone(), DownloadConfig::default());
        downloader.submit(DownloadRequest::new(
            source.display().to_string(),
            temp.path().join("out/nested/copy.txt"),
        ));
        downloader.wait_until_done().await;

        assert_eq!(downloader.error_count(), 0);
        assert_eq!(
            std::fs::read(temp.path().join("out/nested/copy.txt")).unwrap(),
            b"local bytes"
        );
        assert_eq!(transport.request_count(), 0);
        assert_eq!(downloader.report().files_copied, 1);
    }

    #[tokio::test]
    async fn test_truncated_body_is_rejected() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("http://host/short", payload(4096), false);
        transport.truncate_body("http://host/short", 1000);

        let downloader = downloader(transport, DownloadConfig::default());
        downloader.submit(DownloadRequest::new("http://host/short", temp.path().join("short")));
        downloader.wait_until_done().await;

        let errors = downloader.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            DownloadError::Incomplete {
                expected: 4096,
                actual: 1000,
                ..
            }
        ));
        assert!(!temp.path().join("short").exists());
        assert_eq!(downloader.report().files_succeeded, 0);
    }

    #[tokio::test]
    async fn test_one_permit_per_host_serializes_fetches() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MemoryTransport::new().with_fetch_delay(Duration::from_millis(50)));
        transport.insert("http://host/a", payload(256), false);
        transport.insert("http://host/b", payload(256), false);

        let downloader = downloader(
            transport.clone(),
            DownloadConfig::default().with_threads_per_host(1).with_chunk_count(1),
        );
        downloader.submit(DownloadRequest::new("http://host/a", temp.path().join("a")));
        downloader.submit(DownloadRequest::new("http://host/b", temp.path().join("b")));
        downloader.wait_until_done().await;

        assert_eq!(downloader.error_count(), 0);
        assert_eq!(transport.peak_concurrent_fetches(), 1);
    }

    #[tokio::test]
    async fn test_hosts_have_separate_permits() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MemoryTransport::new().with_fetch_delay(Duration::from_millis(50)));
        transport.insert("http://one/a", payload(256), false);
        transport.insert("http://two/b", payload(256), false);

        let downloader = downloader(
            transport.clone(),
            DownloadConfig::default().with_threads_per_host(1).with_chunk_count(1),
        );
        downloader.submit(DownloadRequest::new("http://one/a", temp.path().join("a")));
        downloader.submit(DownloadRequest::new("http://two/b", temp.path().join("b")));
        downloader.wait_until_done().await;

        assert_eq!(downloader.error_count(), 0);
        assert_eq!(transport.peak_concurrent_fetches(), 2);
    }

    #[tokio::test]
    async fn test_missing_resource_is_collected() {
        let temp = TempDir::new().unwrap();
        let downloader = downloader(Arc::new(MemoryTransport::new()), DownloadConfig::default());

        downloader.submit(DownloadRequest::new("http://host/missing", temp.path().join("m")));
        downloader.submit(DownloadRequest::new("/no/such/file", temp.path().join("n")));
        downloader.wait_until_done().await;

        assert_eq!(downloader.error_count(), 2);
    }

    #[tokio::test]
    async fn test_progress_events_reach_notifier() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MemoryTransport::new().with_read_size(512));
        transport.insert("http://host/p", payload(4096), true);
        let notifier = Arc::new(RecordingNotifier::default());

        let downloader = Downloader::with_transport(
            DownloadConfig::default()
                .with_chunk_count(2)
                .with_min_chunk_size(1024)
                .with_chunk_delay(Duration::from_millis(1)),
            transport,
            notifier.clone(),
        );
        downloader.submit(DownloadRequest::new("http://host/p", temp.path().join("p")));
        downloader.wait_until_done().await;

        let updates = notifier.updates();
        assert!(!updates.is_empty());
        assert!(updates.iter().all(|f| (0.0..=1.0).contains(f)));
        assert!(updates.contains(&1.0));
        assert_eq!(notifier.ends(), 1);
    }
}
