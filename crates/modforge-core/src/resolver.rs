//! Load order resolution.
//!
//! Checks run in a fixed order: missing required dependencies, version
//! mismatches, incompatibilities, ordering conflicts, then the topological
//! sort (which is where cycles surface). [`Resolver::resolve`] stops at the
//! first failing check; [`Resolver::diagnose`] runs all of them.

use crate::error::ResolutionError;
use crate::graph::DependencyGraph;
use modforge_manifest::ModManifest;
use semver::{Version, VersionReq};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Aggregated outcome of resolving a candidate set.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    /// Ordering graph over the candidates.
    pub graph: DependencyGraph,

    /// The load order, present only when `errors` is empty.
    pub order: Option<Vec<String>>,

    /// Every problem found, in check order.
    pub errors: Vec<ResolutionError>,
}

impl Diagnosis {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Computes load orders. Pure over its inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver;

impl Resolver {
    /// Resolve a load order or return the first problem found.
    ///
    /// When several manifests share an id, the first one is used.
    pub fn resolve<'a, I>(manifests: I) -> Result<Vec<String>, ResolutionError>
    where
        I: IntoIterator<Item = &'a ModManifest>,
    {
        let candidates = Candidates::new(manifests);

        let checks: [fn(&Candidates<'a>) -> Vec<ResolutionError>; 4] = [
            Candidates::missing_dependencies,
            Candidates::version_mismatches,
            Candidates::incompatibilities,
            Candidates::ordering_conflicts,
        ];
        for check in checks {
            if let Some(error) = check(&candidates).into_iter().next() {
                return Err(error);
            }
        }

        candidates
            .graph()
            .topological_order()
            .map_err(|cycle| ResolutionError::CircularDependency { cycle })
    }

    /// Run every check and collect all problems.
    ///
    /// Disjoint cycles are each reported: after a cycle is found its members
    /// are set aside and the sort is retried on the rest.
    pub fn diagnose<'a, I>(manifests: I) -> Diagnosis
    where
        I: IntoIterator<Item = &'a ModManifest>,
    {
        let candidates = Candidates::new(manifests);

        let mut errors = candidates.missing_dependencies();
        errors.extend(candidates.version_mismatches());
        errors.extend(candidates.incompatibilities());
        errors.extend(candidates.ordering_conflicts());

        let graph = candidates.graph();
        let mut remaining = graph.clone();
        let mut set_aside = BTreeSet::new();
        let order = loop {
            match remaining.topological_order() {
                Ok(order) => break order,
                Err(cycle) => {
                    debug!("Cycle detected: {}", cycle.join(" -> "));
                    set_aside.extend(cycle.iter().cloned());
                    errors.push(ResolutionError::CircularDependency { cycle });
                    remaining = graph.without(&set_aside);
                }
            }
        };

        let order = errors.is_empty().then_some(order);
        Diagnosis {
            graph,
            order,
            errors,
        }
    }
}

/// Candidate manifests keyed by id, first occurrence wins.
struct Candidates<'a> {
    by_id: BTreeMap<&'a str, &'a ModManifest>,
}

impl<'a> Candidates<'a> {
    fn new<I>(manifests: I) -> Self
    where
        I: IntoIterator<Item = &'a ModManifest>,
    {
        let mut by_id = BTreeMap::new();
        for manifest in manifests {
            by_id.entry(manifest.id()).or_insert(manifest);
        }
        Self { by_id }
    }

    fn graph(&self) -> DependencyGraph {
        DependencyGraph::from_manifests(self.by_id.values().copied())
    }

    fn missing_dependencies(&self) -> Vec<ResolutionError> {
        let mut errors = Vec::new();
        for manifest in self.by_id.values() {
            for dep in manifest.dependencies() {
                if !dep.optional && !self.by_id.contains_key(dep.mod_id.as_str()) {
                    errors.push(ResolutionError::MissingDependency {
                        mod_id: manifest.id().to_string(),
                        missing_id: dep.mod_id.clone(),
                    });
                }
            }
        }
        errors
    }

    /// Applies to optional dependencies too once they are present.
    fn version_mismatches(&self) -> Vec<ResolutionError> {
        let mut errors = Vec::new();
        for manifest in self.by_id.values() {
            for dep in manifest.dependencies() {
                let (Some(range), Some(present)) =
                    (dep.version_range.as_deref(), self.by_id.get(dep.mod_id.as_str()))
                else {
                    continue;
                };

                if !satisfies(range, present.version()) {
                    errors.push(ResolutionError::VersionMismatch {
                        mod_id: manifest.id().to_string(),
                        dependency_id: dep.mod_id.clone(),
                        required: range.to_string(),
                        found: present.version().to_string(),
                    });
                }
            }
        }
        errors
    }

    /// One error per unordered pair; the first declarer in id order is reported.
    fn incompatibilities(&self) -> Vec<ResolutionError> {
        let mut seen = BTreeSet::new();
        let mut errors = Vec::new();
        for manifest in self.by_id.values() {
            for incompatible in manifest.incompatible_with() {
                let other = incompatible.mod_id.as_str();
                if other == manifest.id() || !self.by_id.contains_key(other) {
                    continue;
                }
                let pair = if manifest.id() < other {
                    (manifest.id(), other)
                } else {
                    (other, manifest.id())
                };
                if seen.insert(pair) {
                    errors.push(ResolutionError::Incompatible {
                        mod_id: manifest.id().to_string(),
                        other_id: other.to_string(),
                        reason: incompatible.reason.clone(),
                    });
                }
            }
        }
        errors
    }

    /// A hint that would load a mod before one of its hard dependencies.
    fn ordering_conflicts(&self) -> Vec<ResolutionError> {
        let mut errors = Vec::new();
        for manifest in self.by_id.values() {
            for dep in manifest.dependencies() {
                let Some(dependency) = self.by_id.get(dep.mod_id.as_str()) else {
                    continue;
                };
                if manifest.load_before().contains(&dep.mod_id)
                    || dependency.load_after().contains(manifest.id())
                {
                    errors.push(ResolutionError::OrderingConflict {
                        mod_id: manifest.id().to_string(),
                        dependency_id: dep.mod_id.clone(),
                    });
                }
            }
        }
        errors
    }
}

/// Whether `version` satisfies `range`. Unparseable input never satisfies.
fn satisfies(range: &str, version: &str) -> bool {
    match (VersionReq::parse(range), Version::parse(version)) {
        (Ok(req), Ok(version)) => req.matches(&version),
        _ => false,
    }
}
