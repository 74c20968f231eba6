//! Version conflict resolution.
//!
//! Identified modules sharing a coordinate are grouped. A group holding more
//! than one distinct version is a [`Conflict`]; the policy picks one member
//! and every other member is merged into it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, info};

use crate::graph::{ModuleGraph, ModuleId};
use crate::identifier::{self, Coordinate, ModuleIdentifier};

/// Which member of a conflict wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    Oldest,
    #[default]
    Newest,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oldest" => Ok(Self::Oldest),
            "newest" => Ok(Self::Newest),
            other => Err(format!("unknown conflict policy '{other}' (expected oldest or newest)")),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oldest => f.write_str("oldest"),
            Self::Newest => f.write_str("newest"),
        }
    }
}

/// One resolved conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub coordinate: Coordinate,
    pub chosen: ModuleIdentifier,
    pub rejected: Vec<ModuleIdentifier>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rejected: Vec<&str> = self.rejected.iter().map(|r| r.version()).collect();
        write!(
            f,
            "{}: chose {} over {}",
            self.coordinate,
            self.chosen.version(),
            rejected.join(", ")
        )
    }
}

/// Outcome of [`ConflictResolver::resolve`].
#[derive(Debug, Default)]
pub struct Resolved {
    pub conflicts: Vec<Conflict>,
    /// Identified modules reachable from explicit modules after rewriting.
    pub modules: Vec<ModuleId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
}

impl ConflictResolver {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// Resolve conflicts among `identified` and rewrite `graph` so that every
    /// dependency edge points at a chosen module.
    pub fn resolve(&self, graph: &mut ModuleGraph, identified: &[ModuleId]) -> Resolved {
        let mut groups: BTreeMap<Coordinate, Vec<ModuleId>> = BTreeMap::new();
        for &id in identified {
            if let Some(identifier) = &graph.get(id).identifier {
                groups.entry(identifier.coordinate()).or_default().push(id);
            }
        }

        let mut replacement: HashMap<ModuleId, ModuleId> = HashMap::new();
        let mut conflicts = Vec::new();

        for (coordinate, members) in groups {
            if members.len() < 2 {
                continue;
            }

            // One representative per distinct identifier, first seen wins.
            let mut representatives: Vec<(ModuleIdentifier, ModuleId)> = Vec::new();
            for &member in &members {
                let Some(identifier) = graph.get(member).identifier.clone() else {
                    continue;
                };
                match representatives.iter().find(|(i, _)| *i == identifier) {
                    Some(&(_, representative)) => {
                        graph.merge_into(representative, member);
                        replacement.insert(member, representative);
                    }
                    None => representatives.push((identifier, member)),
                }
            }

            if representatives.len() < 2 {
                continue;
            }

            let mut ordered: Vec<ModuleIdentifier> = representatives.iter().map(|(i, _)| i.clone()).collect();
            if let Err(e) = identifier::sort_by_version(&mut ordered) {
                debug!(coordinate = %coordinate, error = %e, "Falling back to raw version order");
                identifier::sort_by_raw_version(&mut ordered);
            }
            let chosen_identifier = match self.policy {
                ConflictPolicy::Oldest => ordered.remove(0),
                ConflictPolicy::Newest => ordered.remove(ordered.len() - 1),
            };
            let Some(&(_, chosen)) = representatives.iter().find(|(i, _)| *i == chosen_identifier) else {
                continue;
            };

            for (identifier, representative) in &representatives {
                if *representative == chosen {
                    continue;
                }
                graph.merge_into(chosen, *representative);
                replacement.insert(*representative, chosen);
                for (member, target) in replacement.iter_mut() {
                    if *target == *representative && *member != chosen {
                        *target = chosen;
                    }
                }
                debug!(rejected = %identifier, chosen = %chosen_identifier, "Rejected conflicting module");
            }

            let conflict = Conflict {
                coordinate,
                chosen: chosen_identifier,
                rejected: ordered,
            };
            info!(conflict = %conflict, "Resolved version conflict");
            conflicts.push(conflict);
        }

        graph.rewrite_edges(|id| replacement.get(&id).copied().unwrap_or(id));

        Resolved {
            conflicts,
            modules: graph.reachable_from_explicit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ModuleSpecification;

    fn spec(text: &str) -> ModuleSpecification {
        text.parse().unwrap()
    }

    fn set_version(graph: &mut ModuleGraph, id: ModuleId, owner: &str, name: &str, version: &str) {
        graph.get_mut(id).identifier = Some(ModuleIdentifier::new("local", "central", owner, name, version));
    }

    /// app depends on a, b and c; each of those pulls a different lib version.
    fn fixture() -> (ModuleGraph, Vec<ModuleId>, [ModuleId; 3], [ModuleId; 3]) {
        let mut graph = ModuleGraph::new();
        let app = graph.add_explicit(spec("org:app"));
        set_version(&mut graph, app, "org", "app", "1");
        let mut identified = vec![app];
        let mut parents = Vec::new();
        let mut libs = Vec::new();

        for (parent, version) in [("a", "1.0"), ("b", "1.2"), ("c", "1.1")] {
            let p = graph.add_dependency(app, spec(&format!("org:{parent}")));
            set_version(&mut graph, p, "org", parent, "1");
            let lib = graph.add_dependency(p, spec("org:lib"));
            set_version(&mut graph, lib, "org", "lib", version);
            identified.extend([p, lib]);
            parents.push(p);
            libs.push(lib);
        }

        (
            graph,
            identified,
            [parents[0], parents[1], parents[2]],
            [libs[0], libs[1], libs[2]],
        )
    }

    #[test]
    fn test_newest_policy() {
        let (mut graph, identified, parents, libs) = fixture();
        let resolved = ConflictResolver::new(ConflictPolicy::Newest).resolve(&mut graph, &identified);

        assert_eq!(resolved.conflicts.len(), 1);
        let conflict = &resolved.conflicts[0];
        assert_eq!(conflict.chosen.version(), "1.2");
        let rejected: Vec<&str> = conflict.rejected.iter().map(|r| r.version()).collect();
        assert_eq!(rejected, vec!["1.0", "1.1"]);

        let chosen = libs[1];
        for parent in parents {
            assert_eq!(graph.get(parent).dependencies, vec![chosen]);
        }
        let mut supplicants = graph.get(chosen).supplicants.clone();
        supplicants.sort();
        assert_eq!(supplicants, parents.to_vec());

        assert!(resolved.modules.contains(&chosen));
        assert!(!resolved.modules.contains(&libs[0]));
        assert!(!resolved.modules.contains(&libs[2]));
    }

    #[test]
    fn test_oldest_policy() {
        let (mut graph, identified, parents, libs) = fixture();
        let resolved = ConflictResolver::new(ConflictPolicy::Oldest).resolve(&mut graph, &identified);

        assert_eq!(resolved.conflicts[0].chosen.version(), "1.0");
        for parent in parents {
            assert_eq!(graph.get(parent).dependencies, vec![libs[0]]);
        }
    }

    #[test]
    fn test_identical_identifiers_merge_silently() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_explicit(spec("org:a"));
        let b = graph.add_explicit(spec("org:b"));
        set_version(&mut graph, a, "org", "a", "1");
        set_version(&mut graph, b, "org", "b", "1");
        let lib1 = graph.add_dependency(a, spec("org:lib"));
        let lib2 = graph.add_dependency(b, spec("org:lib:[1.0,)"));
        set_version(&mut graph, lib1, "org", "lib", "1.0");
        set_version(&mut graph, lib2, "org", "lib", "1.0");

        let resolved = ConflictResolver::default().resolve(&mut graph, &[a, b, lib1, lib2]);

        assert!(resolved.conflicts.is_empty());
        assert_eq!(graph.get(b).dependencies, vec![lib1]);
        assert_eq!(resolved.modules.len(), 3);
    }

    #[test]
    fn test_explicit_flag_is_merged() {
        let mut graph = ModuleGraph::new();
        let app = graph.add_explicit(spec("org:app"));
        set_version(&mut graph, app, "org", "app", "1");
        let old = graph.add_explicit(spec("org:lib:1.0"));
        set_version(&mut graph, old, "org", "lib", "1.0");
        let new = graph.add_dependency(app, spec("org:lib"));
        set_version(&mut graph, new, "org", "lib", "2.0");

        let resolved = ConflictResolver::default().resolve(&mut graph, &[app, old, new]);

        assert_eq!(resolved.conflicts.len(), 1);
        assert!(graph.get(new).explicit);
        assert!(resolved.modules.contains(&new));
        assert!(!resolved.modules.contains(&old));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Oldest".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Oldest));
        assert_eq!("newest".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Newest));
        assert!("latest".parse::<ConflictPolicy>().is_err());
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::Newest);
    }
}
