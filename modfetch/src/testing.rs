//! In-memory test doubles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use crate::download::{ByteRange, ByteStream, DownloadError, RemoteResource, Transport};
use crate::identifier::ModuleIdentifier;
use crate::notify::{EventId, Notifier};
use crate::repository::{ArtifactName, ArtifactSource, Repository, RepositoryError};
use crate::rule::{apply_standard_rule, Rule, RuleOutcome};
use crate::spec::ModuleSpecification;
use crate::BoxFuture;

pub(crate) const MEMORY_PLATFORM: &str = "memory";

/// Repository serving modules registered up front.
pub(crate) struct MemoryRepository {
    name: String,
    modules: Vec<(ModuleIdentifier, Vec<ModuleSpecification>)>,
    artifacts: HashMap<ModuleIdentifier, Vec<ArtifactSource>>,
    delay: Duration,
    failing: bool,
    queries: AtomicUsize,
}

impl MemoryRepository {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: Vec::new(),
            artifacts: HashMap::new(),
            delay: Duration::ZERO,
            failing: false,
            queries: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_module(mut self, owner: &str, name: &str, version: &str, dependencies: &[&str]) -> Self {
        let identifier = self.identifier(owner, name, version);
        let dependencies = dependencies.iter().map(|d| d.parse().unwrap()).collect();
        self.modules.push((identifier, dependencies));
        self
    }

    pub(crate) fn with_artifact(
        mut self,
        owner: &str,
        name: &str,
        version: &str,
        locator: &str,
        extension: &str,
        volatile: bool,
    ) -> Self {
        let identifier = self.identifier(owner, name, version);
        self.artifacts.entry(identifier).or_default().push(ArtifactSource {
            locator: locator.to_string(),
            name: ArtifactName::Extension(extension.to_string()),
            volatile,
        });
        self
    }

    /// Delay every candidate lookup.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every candidate lookup.
    pub(crate) fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub(crate) fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn identifier(&self, owner: &str, name: &str, version: &str) -> ModuleIdentifier {
        ModuleIdentifier::new(MEMORY_PLATFORM, &self.name, owner, name, version)
    }
}

impl Repository for MemoryRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> &str {
        MEMORY_PLATFORM
    }

    fn find_candidates<'a>(
        &'a self,
        specification: &'a ModuleSpecification,
    ) -> BoxFuture<'a, Result<Vec<ModuleIdentifier>, RepositoryError>> {
        Box::pin(async move {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing {
                return Err(RepositoryError::Task(format!("repository '{}' is unavailable", self.name)));
            }
            Ok(self
                .modules
                .iter()
                .map(|(identifier, _)| identifier)
                .filter(|identifier| specification.is_satisfied_by(identifier))
                .cloned()
                .collect())
        })
    }

    fn fetch_dependencies<'a>(
        &'a self,
        identifier: &'a ModuleIdentifier,
    ) -> BoxFuture<'a, Result<Vec<ModuleSpecification>, RepositoryError>> {
        Box::pin(async move {
            self.modules
                .iter()
                .find(|(candidate, _)| candidate == identifier)
                .map(|(_, dependencies)| dependencies.clone())
                .ok_or_else(|| RepositoryError::UnknownModule {
                    repository: self.name.clone(),
                    identifier: identifier.to_string(),
                })
        })
    }

    fn artifacts<'a>(
        &'a self,
        identifier: &'a ModuleIdentifier,
    ) -> BoxFuture<'a, Result<Vec<ArtifactSource>, RepositoryError>> {
        Box::pin(async move { Ok(self.artifacts.get(identifier).cloned().unwrap_or_default()) })
    }

    fn apply_rule(&self, specification: &ModuleSpecification, rule: &Rule) -> RuleOutcome {
        apply_standard_rule(specification, rule)
    }
}

/// Transport serving byte buffers keyed by URL.
pub(crate) struct MemoryTransport {
    resources: Mutex<HashMap<String, (Bytes, bool)>>,
    failing_ranges: Mutex<HashMap<String, u64>>,
    truncated: Mutex<HashMap<String, usize>>,
    read_size: usize,
    fetch_delay: Duration,
    requests: AtomicUsize,
    active_fetches: AtomicUsize,
    peak_fetches: AtomicUsize,
}

impl MemoryTransport {
    pub(crate) fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            failing_ranges: Mutex::new(HashMap::new()),
            truncated: Mutex::new(HashMap::new()),
            read_size: 8 * 1024,
            fetch_delay: Duration::ZERO,
            requests: AtomicUsize::new(0),
            active_fetches: AtomicUsize::new(0),
            peak_fetches: AtomicUsize::new(0),
        }
    }

    /// Hold every fetch open for `delay` before returning its body.
    pub(crate) fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Size of the pieces a body is streamed in.
    pub(crate) fn with_read_size(mut self, size: usize) -> Self {
        self.read_size = size.max(1);
        self
    }

    pub(crate) fn insert(&self, url: &str, data: Vec<u8>, accepts_ranges: bool) {
        self.resources
            .lock()
            .insert(url.to_string(), (Bytes::from(data), accepts_ranges));
    }

    /// Fail ranged fetches of `url` that start at `start`.
    pub(crate) fn fail_range_starting_at(&self, url: &str, start: u64) {
        self.failing_ranges.lock().insert(url.to_string(), start);
    }

    /// Serve only the first `len` bytes of `url` while probes still report
    /// the full size.
    pub(crate) fn truncate_body(&self, url: &str, len: usize) {
        self.truncated.lock().insert(url.to_string(), len);
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Highest number of fetches that were in flight at once.
    pub(crate) fn peak_concurrent_fetches(&self) -> usize {
        self.peak_fetches.load(Ordering::SeqCst)
    }

    fn lookup(&self, url: &str) -> Result<(Bytes, bool), DownloadError> {
        self.resources
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::DownloadFailed {
                url: url.to_string(),
                reason: "404 Not Found".to_string(),
            })
    }
}

impl Transport for MemoryTransport {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RemoteResource, DownloadError>> {
        Box::pin(async move {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let (data, accepts_ranges) = self.lookup(url)?;
            Ok(RemoteResource {
                size: Some(data.len() as u64),
                accepts_ranges,
            })
        })
    }

    fn fetch<'a>(
        &'a self,
        url: &'a str,
        range: Option<ByteRange>,
    ) -> BoxFuture<'a, Result<ByteStream, DownloadError>> {
        Box::pin(async move {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let (mut data, _) = self.lookup(url)?;

            let active = self.active_fetches.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_fetches.fetch_max(active, Ordering::SeqCst);
            if !self.fetch_delay.is_zero() {
                tokio::time::sleep(self.fetch_delay).await;
            }
            self.active_fetches.fetch_sub(1, Ordering::SeqCst);

            if let Some(&len) = self.truncated.lock().get(url) {
                data.truncate(len);
            }

            let body = match range {
                Some(range) => {
                    if self.failing_ranges.lock().get(url) == Some(&range.start) {
                        return Err(DownloadError::DownloadFailed {
                            url: url.to_string(),
                            reason: "connection reset".to_string(),
                        });
                    }
                    data.slice(range.start as usize..=range.end as usize)
                }
                None => data,
            };

            let pieces: Vec<Result<Bytes, DownloadError>> = body
                .chunks(self.read_size)
                .map(|piece| Ok(Bytes::copy_from_slice(piece)))
                .collect();
            Ok(stream::iter(pieces).boxed())
        })
    }
}

/// Notifier recording progress and completion events.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    updates: Mutex<Vec<f64>>,
    ends: AtomicUsize,
    errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub(crate) fn updates(&self) -> Vec<f64> {
        self.updates.lock().clone()
    }

    pub(crate) fn ends(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn update(&self, _id: EventId, fraction: f64) {
        self.updates.lock().push(fraction);
    }

    fn end(&self, _id: EventId, _message: &str) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }

    fn error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }
}
