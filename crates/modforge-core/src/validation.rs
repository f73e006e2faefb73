//! Pre-flight validation of a mod set.
//!
//! Runs discovery, structural checks, a duplicate id scan and the resolver
//! over a mod root without touching any lifecycle manager or loading code,
//! and aggregates every problem into a [`ValidationReport`].

use crate::error::ResolutionError;
use crate::resolver::Resolver;
use chrono::{DateTime, Utc};
use modforge_manifest::{DirectorySource, DiscoveredMod, Discovery, ManifestSource, ModManifest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Category of a validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    MalformedManifest,
    DuplicateModId,
    MissingDependency,
    VersionMismatch,
    IncompatibleMods,
    CircularDependency,
    OrderingConflict,
    DiscoveryFailed,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationErrorKind::MalformedManifest => "malformed manifest",
            ValidationErrorKind::DuplicateModId => "duplicate mod id",
            ValidationErrorKind::MissingDependency => "missing dependency",
            ValidationErrorKind::VersionMismatch => "version mismatch",
            ValidationErrorKind::IncompatibleMods => "incompatible mods",
            ValidationErrorKind::CircularDependency => "circular dependency",
            ValidationErrorKind::OrderingConflict => "ordering conflict",
            ValidationErrorKind::DiscoveryFailed => "discovery failed",
        };
        f.write_str(s)
    }
}

/// One validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub involved_mod_ids: Vec<String>,
    pub message: String,
    /// Manifest paths of the involved mods.
    pub sources: Vec<PathBuf>,
}

/// Result of validating a mod set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    /// Load order, when the set is valid.
    pub load_order: Option<Vec<String>>,
    /// Candidates seen, including unparseable manifests.
    pub mod_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl ValidationReport {
    fn new(errors: Vec<ValidationError>, load_order: Option<Vec<String>>, mod_count: usize) -> Self {
        let is_valid = errors.is_empty();
        Self {
            is_valid,
            errors,
            load_order: if is_valid { load_order } else { None },
            mod_count,
            generated_at: Utc::now(),
        }
    }

    /// Errors of one kind.
    pub fn errors_of(&self, kind: ValidationErrorKind) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}

/// Validates mod sets read through a [`ManifestSource`].
pub struct ValidationEngine<S = DirectorySource> {
    source: S,
    excluded: Vec<String>,
}

impl ValidationEngine<DirectorySource> {
    /// An engine reading `*/mod.toml` directories.
    pub fn for_directories() -> Self {
        Self::new(DirectorySource::new())
    }
}

impl<S: ManifestSource> ValidationEngine<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            excluded: Vec::new(),
        }
    }

    /// Leave the given mod ids out of every discovered set, as if their
    /// directories were absent.
    pub fn excluding<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.excluded.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Discover the mods under `root` and validate them.
    pub fn validate(&self, root: &Path) -> ValidationReport {
        match self.source.discover(root) {
            Ok(discovery) => self.validate_candidates(&discovery.without(&self.excluded)),
            Err(e) => {
                warn!("Discovery failed for {:?}: {}", root, e);
                ValidationReport::new(
                    vec![ValidationError {
                        kind: ValidationErrorKind::DiscoveryFailed,
                        involved_mod_ids: Vec::new(),
                        message: e.to_string(),
                        sources: vec![root.to_path_buf()],
                    }],
                    None,
                    0,
                )
            }
        }
    }

    /// Validate an already discovered candidate set.
    pub fn validate_candidates(&self, discovery: &Discovery) -> ValidationReport {
        let mut errors = Vec::new();

        for (path, e) in &discovery.failures {
            errors.push(ValidationError {
                kind: ValidationErrorKind::MalformedManifest,
                involved_mod_ids: Vec::new(),
                message: e.to_string(),
                sources: vec![path.clone()],
            });
        }

        let mut by_id: BTreeMap<&str, Vec<&DiscoveredMod>> = BTreeMap::new();
        for candidate in &discovery.mods {
            by_id.entry(candidate.id()).or_default().push(candidate);
        }

        for (id, copies) in &by_id {
            if copies.len() > 1 {
                errors.push(ValidationError {
                    kind: ValidationErrorKind::DuplicateModId,
                    involved_mod_ids: vec![id.to_string()],
                    message: format!("mod id '{}' is declared {} times", id, copies.len()),
                    sources: copies.iter().map(|c| c.source.clone()).collect(),
                });
            }
        }

        // the first copy of each id stands in for resolution
        let mut well_formed: Vec<&ModManifest> = Vec::new();
        let mut malformed: BTreeSet<&str> = BTreeSet::new();
        let mut sources: HashMap<&str, PathBuf> = HashMap::new();
        for (id, copies) in &by_id {
            let first = copies[0];
            sources.insert(id, first.source.clone());

            let issues = first.manifest.structural_issues();
            if issues.is_empty() {
                well_formed.push(&first.manifest);
                continue;
            }
            malformed.insert(id);
            for issue in issues {
                errors.push(ValidationError {
                    kind: ValidationErrorKind::MalformedManifest,
                    involved_mod_ids: vec![id.to_string()],
                    message: issue.to_string(),
                    sources: vec![first.source.clone()],
                });
            }
        }

        let diagnosis = Resolver::diagnose(well_formed.iter().copied());
        for error in &diagnosis.errors {
            let involved = error.involved();
            let message = match error {
                ResolutionError::MissingDependency { mod_id, missing_id }
                    if malformed.contains(missing_id.as_str()) =>
                {
                    format!(
                        "mod '{}' requires '{}', whose manifest is malformed",
                        mod_id, missing_id
                    )
                }
                other => other.to_string(),
            };
            errors.push(ValidationError {
                kind: kind_of(error),
                sources: involved
                    .iter()
                    .filter_map(|id| sources.get(id.as_str()).cloned())
                    .collect(),
                involved_mod_ids: involved,
                message,
            });
        }

        let report = ValidationReport::new(errors, diagnosis.order, discovery.len());
        info!(
            "Validated {} mods: {} ({} errors)",
            report.mod_count,
            if report.is_valid { "ok" } else { "invalid" },
            report.errors.len()
        );
        report
    }
}

fn kind_of(error: &ResolutionError) -> ValidationErrorKind {
    match error {
        ResolutionError::MissingDependency { .. } => ValidationErrorKind::MissingDependency,
        ResolutionError::VersionMismatch { .. } => ValidationErrorKind::VersionMismatch,
        ResolutionError::Incompatible { .. } => ValidationErrorKind::IncompatibleMods,
        ResolutionError::OrderingConflict { .. } => ValidationErrorKind::OrderingConflict,
        ResolutionError::CircularDependency { .. } => ValidationErrorKind::CircularDependency,
    }
}
