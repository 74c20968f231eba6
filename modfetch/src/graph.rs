//! Module dependency graph.
//!
//! Modules live in an arena addressed by [`ModuleId`]. Dependency edges are
//! forward lists of ids; supplicant edges point back at the modules that
//! depend on a node. Nodes are never removed during a run, so ids stay valid.

use std::collections::HashSet;

use crate::identifier::ModuleIdentifier;
use crate::spec::ModuleSpecification;

/// Handle to a module in a [`ModuleGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(usize);

impl ModuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node in the graph.
#[derive(Debug, Clone)]
pub struct Module {
    pub explicit: bool,
    pub identifier: Option<ModuleIdentifier>,
    pub specification: ModuleSpecification,
    pub dependencies: Vec<ModuleId>,
    pub supplicants: Vec<ModuleId>,
}

impl Module {
    fn new(specification: ModuleSpecification, explicit: bool) -> Self {
        Self {
            explicit,
            identifier: None,
            specification,
            dependencies: Vec::new(),
            supplicants: Vec::new(),
        }
    }

    pub fn is_identified(&self) -> bool {
        self.identifier.is_some()
    }
}

/// Arena of modules.
#[derive(Debug, Default, Clone)]
pub struct ModuleGraph {
    modules: Vec<Module>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module requested directly by the user.
    pub fn add_explicit(&mut self, specification: ModuleSpecification) -> ModuleId {
        self.push(Module::new(specification, true))
    }

    /// Add a dependency of `parent` and link both directions.
    pub fn add_dependency(&mut self, parent: ModuleId, specification: ModuleSpecification) -> ModuleId {
        let child = self.push(Module::new(specification, false));
        self.link_dependency(parent, child);
        child
    }

    /// Link an existing module as a dependency of `parent`.
    pub fn link_dependency(&mut self, parent: ModuleId, child: ModuleId) {
        if !self.modules[parent.0].dependencies.contains(&child) {
            self.modules[parent.0].dependencies.push(child);
        }
        if !self.modules[child.0].supplicants.contains(&parent) {
            self.modules[child.0].supplicants.push(parent);
        }
    }

    fn push(&mut self, module: Module) -> ModuleId {
        let id = ModuleId(self.modules.len());
        self.modules.push(module);
        id
    }

    pub fn get(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    pub fn get_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = ModuleId> {
        (0..self.modules.len()).map(ModuleId)
    }

    pub fn explicit_modules(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.ids().filter(|id| self.get(*id).explicit)
    }

    /// Merge `rejected` into `chosen`: the explicit flag moves to `chosen`
    /// and supplicants not yet present are appended. Supplicants are
    /// compared by id and by identifier.
    pub fn merge_into(&mut self, chosen: ModuleId, rejected: ModuleId) {
        if chosen == rejected {
            return;
        }
        let explicit = self.modules[rejected.0].explicit;
        let incoming = self.modules[rejected.0].supplicants.clone();

        for supplicant in incoming {
            if supplicant == chosen {
                continue;
            }
            let duplicate = {
                let candidate = &self.modules[supplicant.0];
                self.modules[chosen.0].supplicants.iter().any(|existing| {
                    *existing == supplicant
                        || (candidate.identifier.is_some()
                            && self.modules[existing.0].identifier == candidate.identifier)
                })
            };
            if !duplicate {
                self.modules[chosen.0].supplicants.push(supplicant);
            }
        }
        self.modules[chosen.0].explicit |= explicit;
        self.modules[rejected.0].explicit = false;
    }

    /// Rewrite every dependency edge using `replacement`, visiting each module
    /// once. Self-edges produced by the rewrite and duplicate edges are
    /// dropped.
    pub fn rewrite_edges(&mut self, replacement: impl Fn(ModuleId) -> ModuleId) {
        let mut visited = HashSet::new();
        for id in self.ids() {
            if !visited.insert(id) {
                continue;
            }
            let dependencies = std::mem::take(&mut self.modules[id.0].dependencies);
            let mut rewritten = Vec::with_capacity(dependencies.len());
            for dependency in dependencies {
                let target = replacement(dependency);
                if target != id && !rewritten.contains(&target) {
                    rewritten.push(target);
                }
            }
            self.modules[id.0].dependencies = rewritten;
        }
    }

    /// Identified modules reachable from explicit modules through dependency
    /// edges, in discovery order.
    pub fn reachable_from_explicit(&self) -> Vec<ModuleId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<ModuleId> = self.explicit_modules().collect();
        stack.reverse();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let module = self.get(id);
            if !module.is_identified() {
                continue;
            }
            order.push(id);
            for dependency in module.dependencies.iter().rev() {
                if !visited.contains(dependency) {
                    stack.push(*dependency);
                }
            }
        }
        order
    }
}
