//! End-to-end installation runs.
//!
//! An [`Installer`] owns one run over a fixed set of repositories:
//!
//! 1. Load the state of the previous run
//! 2. Identify the explicit modules and their dependencies
//! 3. Resolve version conflicts
//! 4. Collect artifacts and download the ones that are not up to date
//! 5. Reconcile against the previous state and persist the new one
//!
//! [`Installer::resolve`] stops after step 3.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::checksum;
use crate::config::{ConfigFile, EngineConfig};
use crate::conflict::{Conflict, ConflictResolver};
use crate::download::{DownloadConfig, DownloadReport, DownloadRequest, Downloader, Transport, Validator};
use crate::error::{Error, Result};
use crate::graph::{ModuleGraph, ModuleId};
use crate::identifier::ModuleIdentifier;
use crate::identify::{IdentificationEngine, IdentificationStats};
use crate::layout::ArtifactLayout;
use crate::notify::{EventId, Notifier};
use crate::platform::PlatformRegistry;
use crate::repository::{ArtifactSource, Repository};
use crate::rule::Rule;
use crate::spec::ModuleSpecification;
use crate::state::{Artifact, ModuleRecord, Reconciler, Reconciliation, State};
use crate::BoxFuture;

/// An explicit module and what it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplicitModule {
    pub specification: String,
    pub identifier: Option<ModuleIdentifier>,
}

/// Outcome of identification and conflict resolution.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub explicit: Vec<ExplicitModule>,
    /// Final module set, sorted.
    pub modules: Vec<ModuleIdentifier>,
    /// Specifications no repository could satisfy.
    pub unidentified: Vec<String>,
    /// Specifications excluded by a rule.
    pub excluded: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub stats: IdentificationStats,
}

impl ResolutionReport {
    pub fn is_complete(&self) -> bool {
        self.unidentified.is_empty()
    }
}

/// Outcome of a successful installation.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub resolution: ResolutionReport,
    /// Files fetched by this run.
    pub installed: Vec<PathBuf>,
    /// Files already up to date.
    pub skipped: Vec<PathBuf>,
    pub download: DownloadReport,
    pub reconciliation: Reconciliation,
    /// Whether the state file was rewritten.
    pub state_saved: bool,
}

/// Graph and report of one resolution.
struct Resolution {
    graph: ModuleGraph,
    modules: Vec<ModuleId>,
    report: ResolutionReport,
}

/// Validates downloads through the repository that offered the artifact.
struct RepositoryValidator {
    repository: Arc<dyn Repository>,
    identifier: ModuleIdentifier,
    source: ArtifactSource,
}

impl Validator for RepositoryValidator {
    fn validate<'a>(&'a self, file: &'a Path) -> BoxFuture<'a, std::result::Result<(), String>> {
        Box::pin(async move {
            self.repository
                .validate(&self.identifier, &self.source, file)
                .await
                .map_err(|e| e.to_string())
        })
    }
}

/// A planned artifact: where it goes and whether it must be fetched.
struct Planned {
    artifact: Artifact,
    request: Option<DownloadRequest>,
}

/// Runs resolution and installation.
pub struct Installer {
    engine: EngineConfig,
    download: DownloadConfig,
    repositories: Vec<Arc<dyn Repository>>,
    rules: Vec<Rule>,
    notifier: Arc<dyn Notifier>,
    transport: Option<Arc<dyn Transport>>,
}

impl Installer {
    /// Create an installer over `repositories`, given in priority order.
    pub fn new(
        engine: EngineConfig,
        download: DownloadConfig,
        repositories: Vec<Arc<dyn Repository>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            engine,
            download,
            repositories,
            rules: Vec::new(),
            notifier,
            transport: None,
        }
    }

    /// Build an installer from a configuration file. Repositories that
    /// cannot be created are reported and skipped.
    pub fn from_config(config: &ConfigFile, platforms: &PlatformRegistry, notifier: Arc<dyn Notifier>) -> Self {
        let repositories = platforms.create_all(&config.repositories, notifier.as_ref());
        Self::new(config.engine.clone(), config.download.clone(), repositories, notifier)
            .with_rules(config.rules.clone())
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    /// Use `transport` for remote artifacts instead of HTTP.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn repositories(&self) -> &[Arc<dyn Repository>] {
        &self.repositories
    }

    /// Identify `specifications` and resolve conflicts.
    pub async fn resolve(&self, specifications: Vec<ModuleSpecification>) -> ResolutionReport {
        self.resolution(specifications).await.report
    }

    /// Install `specifications` into the configured directory.
    pub async fn install(&self, specifications: Vec<ModuleSpecification>) -> Result<InstallReport> {
        let mut state = State::load(self.engine.state_path())?;
        let resolution = self.resolution(specifications).await;

        if !resolution.report.is_complete() {
            let modules = resolution.report.unidentified.clone();
            return Err(Error::Unidentified {
                count: modules.len(),
                modules,
            });
        }

        let sources = self.collect_sources(&resolution).await?;
        let planned = self.plan(&state, sources)?;

        let downloader = match &self.transport {
            Some(transport) => Downloader::with_transport(self.download.clone(), Arc::clone(transport), self.notifier.clone()),
            None => Downloader::new(self.download.clone(), self.notifier.clone())?,
        };

        let event = EventId::next();
        let mut installed = Vec::new();
        let mut skipped = Vec::new();
        let mut current = Vec::with_capacity(planned.len());
        for Planned { artifact, request } in planned {
            match request {
                Some(request) => {
                    installed.push(artifact.file().to_path_buf());
                    downloader.submit(request);
                }
                None => skipped.push(artifact.file().to_path_buf()),
            }
            current.push(artifact);
        }

        self.notifier
            .begin(event, &format!("Installing {} artifact(s)", installed.len()));
        downloader.wait_until_done().await;

        let errors = downloader.take_errors();
        if !errors.is_empty() {
            for error in &errors {
                self.notifier.error(&error.to_string());
            }
            self.notifier
                .fail(event, &format!("{} transfer(s) failed", errors.len()));
            state.discard()?;
            return Err(Error::InstallationFailed {
                failed: errors.len(),
                total: installed.len(),
            });
        }
        self.notifier
            .end(event, &format!("Installed {} artifact(s)", installed.len()));

        let current = record_digests(current, &installed)?;
        let reconciliation = Reconciler::new(self.engine.install_dir()).reconcile(&mut state, &current);
        for file in &reconciliation.retained {
            self.notifier
                .info(&format!("Keeping modified file {}", file.display()));
        }
        for (file, reason) in &reconciliation.failed {
            self.notifier
                .error(&format!("Failed to delete {}: {reason}", file.display()));
        }

        state.set_modules(explicit_records(&resolution.report));
        let state_saved = state.save_if_changed()?;

        info!(
            installed = installed.len(),
            skipped = skipped.len(),
            deleted = reconciliation.deleted.len(),
            state_saved,
            "Installation complete"
        );

        Ok(InstallReport {
            resolution: resolution.report,
            installed,
            skipped,
            download: downloader.report(),
            reconciliation,
            state_saved,
        })
    }

    async fn resolution(&self, specifications: Vec<ModuleSpecification>) -> Resolution {
        let engine = IdentificationEngine::new(
            self.repositories.clone(),
            self.rules.clone(),
            self.engine.identification_workers,
            self.engine.recursive,
            self.notifier.clone(),
        );
        let mut identification = engine.run(specifications).await;

        let resolver = ConflictResolver::new(self.engine.conflict_policy);
        let resolved = resolver.resolve(&mut identification.graph, &identification.identified);
        for conflict in &resolved.conflicts {
            self.notifier.info(&format!("Conflict {conflict}"));
        }

        let graph = identification.graph;
        let mut modules: Vec<ModuleIdentifier> = resolved
            .modules
            .iter()
            .filter_map(|id| graph.get(*id).identifier.clone())
            .collect();
        modules.sort_by_key(ToString::to_string);

        let explicit = graph
            .explicit_modules()
            .map(|id| {
                let module = graph.get(id);
                ExplicitModule {
                    specification: module.specification.to_string(),
                    identifier: module.identifier.clone(),
                }
            })
            .collect();

        let report = ResolutionReport {
            explicit,
            modules,
            unidentified: specification_names(&graph, &identification.unidentified),
            excluded: specification_names(&graph, &identification.excluded),
            conflicts: resolved.conflicts,
            stats: engine.stats(),
        };

        Resolution {
            graph,
            modules: resolved.modules,
            report,
        }
    }

    /// Ask the owning repository of every final module for its artifacts.
    async fn collect_sources(
        &self,
        resolution: &Resolution,
    ) -> Result<Vec<(Arc<dyn Repository>, ModuleIdentifier, ArtifactSource)>> {
        let by_name: HashMap<&str, &Arc<dyn Repository>> =
            self.repositories.iter().map(|r| (r.name(), r)).collect();

        let mut owned = Vec::new();
        for id in &resolution.modules {
            let Some(identifier) = resolution.graph.get(*id).identifier.clone() else {
                continue;
            };
            if let Some(repository) = by_name.get(identifier.repository()) {
                owned.push((Arc::clone(repository), identifier));
            } else {
                warn!(module = %identifier, "Module repository is no longer configured");
            }
        }

        let listings = join_all(owned.iter().map(|(repository, identifier)| repository.artifacts(identifier))).await;

        let mut sources = Vec::new();
        for ((repository, identifier), listing) in owned.into_iter().zip(listings) {
            for source in listing? {
                sources.push((Arc::clone(&repository), identifier.clone(), source));
            }
        }
        debug!(artifacts = sources.len(), "Collected artifact sources");
        Ok(sources)
    }

    /// Decide which artifacts must be fetched.
    ///
    /// Existing volatile files are never overwritten. Existing non-volatile
    /// files are skipped when the previous run installed them from the same
    /// source.
    fn plan(
        &self,
        state: &State,
        sources: Vec<(Arc<dyn Repository>, ModuleIdentifier, ArtifactSource)>,
    ) -> Result<Vec<Planned>> {
        let layout = if self.engine.flat_layout {
            ArtifactLayout::flat(self.engine.install_dir())
        } else {
            ArtifactLayout::hierarchical(self.engine.install_dir())
        };

        let mut seen = HashSet::new();
        let mut planned = Vec::with_capacity(sources.len());
        for (repository, identifier, source) in sources {
            let destination = layout.path_for(&identifier, &source.name);
            let artifact = Artifact::new(&destination, source.locator.clone(), source.volatile);
            if !seen.insert(artifact.file().to_path_buf()) {
                warn!(file = %artifact.file().display(), module = %identifier, "Skipping duplicate artifact path");
                continue;
            }

            let previous = state.get(artifact.file());
            let exists = artifact.file().is_file();

            if source.volatile && exists {
                let artifact = match previous {
                    Some(previous) => previous.clone(),
                    None => {
                        let digest = checksum::file_digest(artifact.file()).map_err(|e| Error::Io {
                            path: artifact.file().to_path_buf(),
                            source: e,
                        })?;
                        artifact.with_digest(digest)
                    }
                };
                debug!(file = %artifact.file().display(), "Keeping installed volatile file");
                planned.push(Planned { artifact, request: None });
                continue;
            }

            if exists && previous.is_some_and(|p| p.source == source.locator && !p.volatile) {
                debug!(file = %artifact.file().display(), "Artifact up to date");
                planned.push(Planned { artifact, request: None });
                continue;
            }

            let validator = RepositoryValidator {
                repository,
                identifier,
                source: source.clone(),
            };
            let request = DownloadRequest::new(source.locator, destination).with_validator(Arc::new(validator));
            planned.push(Planned {
                artifact,
                request: Some(request),
            });
        }
        Ok(planned)
    }
}

/// Record the installed digest of every volatile artifact fetched this run.
fn record_digests(current: Vec<Artifact>, installed: &[PathBuf]) -> Result<Vec<Artifact>> {
    current
        .into_iter()
        .map(|artifact| {
            if !artifact.volatile || !installed.iter().any(|f| f == artifact.file()) {
                return Ok(artifact);
            }
            let digest = checksum::file_digest(artifact.file()).map_err(|e| Error::Io {
                path: artifact.file().to_path_buf(),
                source: e,
            })?;
            Ok(artifact.with_digest(digest))
        })
        .collect()
}

fn explicit_records(report: &ResolutionReport) -> Vec<ModuleRecord> {
    report
        .explicit
        .iter()
        .filter_map(|module| {
            module.identifier.as_ref().map(|identifier| ModuleRecord {
                specification: module.specification.clone(),
                identifier: identifier.to_string(),
            })
        })
        .collect()
}

fn specification_names(graph: &ModuleGraph, ids: &[ModuleId]) -> Vec<String> {
    let mut names: Vec<String> = ids
        .iter()
        .map(|id| graph.get(*id).specification.to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}
