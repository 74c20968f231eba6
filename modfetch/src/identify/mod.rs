//! Identification engine.
//!
//! Resolves explicit specifications into a graph of concrete identifiers,
//! recursing into declared dependencies.
//!
//! # Architecture
//!
//! ```text
//! add_explicit ──► submit ──► [semaphore] ──► identify
//!                    ▲                          │
//!                    │        ┌─────────────────┤
//!                    │        ▼                 ▼
//!                    │   rule pipeline     job registry ── waiting ──► parked
//!                    │        │                 │ owner
//!                    │        ▼                 ▼
//!                    │     excluded      query repositories
//!                    │                          │
//!                    └── dependencies ◄─────────┴──► continuations resubmitted
//! ```
//!
//! Every task holds a [`WorkGuard`](crate::barrier::WorkGuard) so
//! [`IdentificationEngine::wait_until_done`] resolves only after recursive
//! work has drained. A specification is queried at most once per run; other
//! modules with the same specification copy the result.

mod registry;
mod rules;

pub use registry::{Claim, JobRegistry};
pub use rules::{RuleDirectives, RulePipeline};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::barrier::WorkTracker;
use crate::graph::{ModuleGraph, ModuleId};
use crate::identifier::{self, ModuleIdentifier};
use crate::notify::{EventId, Notifier};
use crate::repository::Repository;
use crate::rule::Rule;
use crate::spec::ModuleSpecification;

/// Snapshot of identification counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IdentificationStats {
    /// Specifications looked up in repositories.
    pub queries: u64,
    /// Modules that reused the result of an equal specification.
    pub cache_hits: u64,
    /// Modules parked behind an in-progress specification.
    pub continuations: u64,
    /// Specifications no repository could satisfy.
    pub failures: u64,
    /// Modules excluded by a rule.
    pub excluded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queries: AtomicU64,
    cache_hits: AtomicU64,
    continuations: AtomicU64,
    failures: AtomicU64,
    excluded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> IdentificationStats {
        IdentificationStats {
            queries: self.queries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            continuations: self.continuations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
        }
    }
}

/// The result of an identification run.
#[derive(Debug, Default)]
pub struct Identification {
    pub graph: ModuleGraph,
    pub identified: Vec<ModuleId>,
    pub unidentified: Vec<ModuleId>,
    pub excluded: Vec<ModuleId>,
}

#[derive(Default)]
struct GraphState {
    graph: ModuleGraph,
    identified: Vec<ModuleId>,
    unidentified: Vec<ModuleId>,
    excluded: Vec<ModuleId>,
    resolved: HashMap<ModuleSpecification, ModuleId>,
    failed: HashSet<ModuleSpecification>,
}

impl GraphState {
    fn mark_identified(&mut self, id: ModuleId) {
        if !self.identified.contains(&id) {
            self.identified.push(id);
        }
    }

    fn mark_unidentified(&mut self, id: ModuleId) {
        if !self.unidentified.contains(&id) {
            self.unidentified.push(id);
        }
    }
}

/// Per-call identification context, inherited by recursive dependencies.
#[derive(Debug, Clone)]
struct IdentifyContext {
    recursive: bool,
    restrict: Option<Arc<Vec<String>>>,
}

impl IdentifyContext {
    fn narrowed(&self, directives: &RuleDirectives) -> Self {
        let restrict = match (&self.restrict, &directives.restrict) {
            (current, None) => current.clone(),
            (None, Some(names)) => Some(Arc::new(names.clone())),
            (Some(current), Some(names)) => Some(Arc::new(
                current.iter().filter(|n| names.contains(n)).cloned().collect(),
            )),
        };
        Self {
            recursive: self.recursive && !directives.exclude_dependencies,
            restrict,
        }
    }

    fn allows(&self, repository: &str) -> bool {
        match &self.restrict {
            None => true,
            Some(names) => names.iter().any(|n| n == repository),
        }
    }
}

type Continuation = (ModuleId, IdentifyContext);

struct EngineInner {
    repositories: Vec<Arc<dyn Repository>>,
    rules: RulePipeline,
    state: Mutex<GraphState>,
    jobs: JobRegistry<ModuleSpecification, Continuation>,
    permits: Arc<Semaphore>,
    tracker: WorkTracker,
    notifier: Arc<dyn Notifier>,
    counters: Counters,
    recursive: bool,
}

/// Resolves specifications into a module graph.
#[derive(Clone)]
pub struct IdentificationEngine {
    inner: Arc<EngineInner>,
}

impl IdentificationEngine {
    /// Create an engine over `repositories`, given in priority order.
    pub fn new(
        repositories: Vec<Arc<dyn Repository>>,
        rules: Vec<Rule>,
        workers: usize,
        recursive: bool,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                repositories,
                rules: RulePipeline::new(rules),
                state: Mutex::new(GraphState::default()),
                jobs: JobRegistry::new(),
                permits: Arc::new(Semaphore::new(workers.max(1))),
                tracker: WorkTracker::new(),
                notifier,
                counters: Counters::default(),
                recursive,
            }),
        }
    }

    /// Add an explicit module to the graph without identifying it.
    pub fn add_explicit(&self, specification: ModuleSpecification) -> ModuleId {
        self.inner.state.lock().graph.add_explicit(specification)
    }

    /// Schedule identification of `id`. Must be called from within a tokio
    /// runtime.
    pub fn submit(&self, id: ModuleId) {
        let context = IdentifyContext {
            recursive: self.inner.recursive,
            restrict: None,
        };
        EngineInner::submit(&self.inner, id, context);
    }

    /// Resolve once all submitted work, including recursion, has finished.
    pub async fn wait_until_done(&self) {
        self.inner.tracker.wait_until_done().await;
    }

    /// Identify `specifications` and everything they depend on.
    pub async fn run(&self, specifications: Vec<ModuleSpecification>) -> Identification {
        let event = EventId::next();
        self.inner
            .notifier
            .begin(event, &format!("Identifying {} module(s)", specifications.len()));

        for specification in specifications {
            let id = self.add_explicit(specification);
            self.submit(id);
        }
        self.wait_until_done().await;

        let result = self.take_result();
        let message = format!(
            "Identified {} module(s), {} unidentified",
            result.identified.len(),
            result.unidentified.len()
        );
        if result.unidentified.is_empty() {
            self.inner.notifier.end(event, &message);
        } else {
            self.inner.notifier.fail(event, &message);
        }
        result
    }

    /// Move the graph and module sets out of the engine. The engine starts
    /// over with an empty graph and job registry.
    pub fn take_result(&self) -> Identification {
        let mut state = self.inner.state.lock();
        let state = std::mem::take(&mut *state);
        self.inner.jobs.clear();
        Identification {
            graph: state.graph,
            identified: state.identified,
            unidentified: state.unidentified,
            excluded: state.excluded,
        }
    }

    pub fn stats(&self) -> IdentificationStats {
        self.inner.counters.snapshot()
    }
}

impl EngineInner {
    fn submit(self: &Arc<Self>, id: ModuleId, context: IdentifyContext) {
        let guard = self.tracker.register();
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = Arc::clone(&inner.permits).acquire_owned().await else {
                return;
            };
            inner.identify(id, context).await;
        });
    }

    async fn identify(self: &Arc<Self>, id: ModuleId, context: IdentifyContext) {
        let specification = {
            let mut state = self.state.lock();
            let module = state.graph.get(id);
            if module.is_identified() {
                return;
            }
            let specification = module.specification.clone();
            if state.failed.contains(&specification) {
                state.mark_unidentified(id);
                return;
            }
            specification
        };

        let directives = self
            .rules
            .evaluate(&specification, &self.repositories, self.notifier.as_ref());
        if directives.exclude {
            self.state.lock().excluded.push(id);
            self.counters.excluded.fetch_add(1, Ordering::Relaxed);
            info!(module = %specification, "Module excluded by rule");
            self.notifier.info(&format!("Excluded {specification}"));
            return;
        }
        let context = context.narrowed(&directives);

        if self.copy_resolved(id, &specification) {
            return;
        }

        match self.jobs.claim(&specification, || (id, context.clone())) {
            Claim::Owner => {}
            Claim::Waiting => {
                self.counters.continuations.fetch_add(1, Ordering::Relaxed);
                debug!(module = %specification, "Waiting for in-progress identification");
                return;
            }
            Claim::Done => {
                // Finished between the cache check and the claim.
                self.submit(id, context);
                return;
            }
        }

        let dependencies = self.resolve(id, &specification, &context).await;

        for (waiter, waiter_context) in self.jobs.complete(&specification) {
            self.submit(waiter, waiter_context);
        }

        if context.recursive {
            for dependency in dependencies {
                self.submit(dependency, context.clone());
            }
        }
    }

    /// Copy the result of an already identified equal specification.
    fn copy_resolved(&self, id: ModuleId, specification: &ModuleSpecification) -> bool {
        let mut state = self.state.lock();
        let Some(&source) = state.resolved.get(specification) else {
            return false;
        };
        let resolved = state.graph.get(source);
        let identifier = resolved.identifier.clone();
        let dependencies = resolved.dependencies.clone();

        state.graph.get_mut(id).identifier = identifier;
        for dependency in dependencies {
            state.graph.link_dependency(id, dependency);
        }
        state.mark_identified(id);
        self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        debug!(module = %specification, "Reused identification result");
        true
    }

    /// Query repositories, record the outcome and return new dependency
    /// modules.
    async fn resolve(
        &self,
        id: ModuleId,
        specification: &ModuleSpecification,
        context: &IdentifyContext,
    ) -> Vec<ModuleId> {
        let event = EventId::next();
        self.notifier.begin(event, &format!("Identifying {specification}"));
        self.counters.queries.fetch_add(1, Ordering::Relaxed);

        let Some(chosen) = self.select_candidate(specification, context).await else {
            self.fail(id, specification, event, format!("No module satisfies {specification}"));
            return Vec::new();
        };

        let Some(repository) = self.repository(chosen.repository()) else {
            self.fail(
                id,
                specification,
                event,
                format!("Repository '{}' of {chosen} is not configured", chosen.repository()),
            );
            return Vec::new();
        };

        let dependency_specs = match repository.fetch_dependencies(&chosen).await {
            Ok(specs) => specs,
            Err(e) => {
                warn!(module = %chosen, error = %e, "Failed to fetch dependencies");
                self.fail(id, specification, event, format!("Dependencies of {chosen}: {e}"));
                return Vec::new();
            }
        };

        let dependencies = {
            let mut state = self.state.lock();
            state.graph.get_mut(id).identifier = Some(chosen.clone());
            let dependencies: Vec<ModuleId> = dependency_specs
                .into_iter()
                .map(|spec| state.graph.add_dependency(id, spec))
                .collect();
            state.resolved.insert(specification.clone(), id);
            state.mark_identified(id);
            dependencies
        };

        info!(module = %chosen, dependencies = dependencies.len(), "Module identified");
        self.notifier.end(event, &format!("Identified {chosen}"));
        dependencies
    }

    async fn select_candidate(
        &self,
        specification: &ModuleSpecification,
        context: &IdentifyContext,
    ) -> Option<ModuleIdentifier> {
        let repositories: Vec<&Arc<dyn Repository>> = self
            .repositories
            .iter()
            .filter(|r| context.allows(r.name()))
            .collect();

        let results = join_all(repositories.iter().map(|r| r.find_candidates(specification))).await;

        let mut candidates: Vec<ModuleIdentifier> = Vec::new();
        for (repository, result) in repositories.iter().zip(results) {
            match result {
                Ok(found) => {
                    for candidate in found {
                        if specification.is_satisfied_by(&candidate) && !candidates.contains(&candidate) {
                            candidates.push(candidate);
                        }
                    }
                }
                Err(e) => {
                    warn!(repository = repository.name(), module = %specification, error = %e, "Candidate lookup failed");
                    self.notifier
                        .error(&format!("Repository '{}' failed for {specification}: {e}", repository.name()));
                }
            }
        }

        if let Err(e) = identifier::sort_by_version(&mut candidates) {
            debug!(error = %e, "Falling back to raw version order");
            identifier::sort_by_raw_version(&mut candidates);
        }

        // Equal versions keep repository priority order.
        let highest = candidates.last()?.version().to_string();
        candidates.into_iter().find(|c| c.version() == highest)
    }

    fn fail(&self, id: ModuleId, specification: &ModuleSpecification, event: EventId, message: String) {
        {
            let mut state = self.state.lock();
            state.failed.insert(specification.clone());
            state.mark_unidentified(id);
        }
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        warn!(module = %specification, "{}", message);
        self.notifier.fail(event, &message);
    }

    fn repository(&self, name: &str) -> Option<&Arc<dyn Repository>> {
        self.repositories.iter().find(|r| r.name() == name)
    }
}
