//! Mod manifest model and parsing.
//!
//! Each mod ships a `mod.toml` describing its identity, dependencies,
//! ordering hints, incompatibilities and the capabilities it needs.
//! Parsing only checks that the document has the right shape; structural
//! rules (non-empty id, no self reference, well-formed versions) are
//! reported by [`ModManifest::structural_issues`] so that a broken mod is
//! still discovered and reported rather than silently dropped.

use crate::capability::CapabilitySet;
use crate::error::{ManifestError, ManifestResult};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// File name of the manifest inside a mod directory.
pub const MANIFEST_FILE_NAME: &str = "mod.toml";

/// Immutable description of one mod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModManifest {
    id: String,
    name: String,
    author: String,
    description: String,
    version: String,
    dependencies: Vec<DependencySpec>,
    load_after: BTreeSet<String>,
    load_before: BTreeSet<String>,
    incompatible_with: Vec<Incompatibility>,
    capabilities: CapabilitySet,
    entry_point: Option<String>,
}

/// A dependency on another mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Id of the required mod.
    #[serde(rename = "id")]
    pub mod_id: String,

    /// Semver requirement the dependency's version must satisfy.
    #[serde(default, rename = "version", skip_serializing_if = "Option::is_none")]
    pub version_range: Option<String>,

    /// Optional dependencies only constrain ordering when present.
    #[serde(default)]
    pub optional: bool,
}

impl DependencySpec {
    /// A required dependency without a version requirement.
    pub fn required(mod_id: impl Into<String>) -> Self {
        Self {
            mod_id: mod_id.into(),
            version_range: None,
            optional: false,
        }
    }

    /// An optional dependency without a version requirement.
    pub fn optional(mod_id: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::required(mod_id)
        }
    }

    /// Attach a semver requirement such as `">=1.2, <2"`.
    pub fn with_version(mut self, range: impl Into<String>) -> Self {
        self.version_range = Some(range.into());
        self
    }

    /// Parse the version requirement, if any.
    pub fn version_req(&self) -> Result<Option<VersionReq>, semver::Error> {
        self.version_range
            .as_deref()
            .map(VersionReq::parse)
            .transpose()
    }
}

/// A declared incompatibility with another mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incompatibility {
    /// Id of the incompatible mod.
    #[serde(rename = "id")]
    pub mod_id: String,

    /// Human-readable reason shown in reports.
    #[serde(default)]
    pub reason: String,
}

/// Which manifest field refers back to the mod itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceField {
    Dependencies,
    LoadAfter,
    LoadBefore,
}

impl ReferenceField {
    fn as_str(self) -> &'static str {
        match self {
            ReferenceField::Dependencies => "dependencies",
            ReferenceField::LoadAfter => "load_after",
            ReferenceField::LoadBefore => "load_before",
        }
    }
}

/// A structural defect in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralIssue {
    #[error("mod id is empty")]
    EmptyId,

    #[error("mod '{mod_id}' references itself in {}", .field.as_str())]
    SelfReference { mod_id: String, field: ReferenceField },

    #[error("mod '{mod_id}' has malformed version '{version}': {reason}")]
    MalformedVersion {
        mod_id: String,
        version: String,
        reason: String,
    },

    #[error("mod '{mod_id}' has malformed version range '{range}' for dependency '{dependency}': {reason}")]
    MalformedVersionRange {
        mod_id: String,
        dependency: String,
        range: String,
        reason: String,
    },
}

impl ModManifest {
    /// Start building a manifest in code.
    pub fn builder(id: impl Into<String>, version: impl Into<String>) -> ModManifestBuilder {
        ModManifestBuilder::new(id, version)
    }

    /// Load a manifest from a TOML file.
    pub fn from_file(path: &Path) -> ManifestResult<Self> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The version exactly as declared.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The declared version parsed as a semantic version.
    pub fn semantic_version(&self) -> Option<Version> {
        Version::parse(&self.version).ok()
    }

    pub fn dependencies(&self) -> &[DependencySpec] {
        &self.dependencies
    }

    pub fn load_after(&self) -> &BTreeSet<String> {
        &self.load_after
    }

    pub fn load_before(&self) -> &BTreeSet<String> {
        &self.load_before
    }

    pub fn incompatible_with(&self) -> &[Incompatibility] {
        &self.incompatible_with
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Artifact file name relative to the mod directory.
    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    /// Run the structural checks. An empty result means the manifest is well formed.
    pub fn structural_issues(&self) -> Vec<StructuralIssue> {
        let mut issues = Vec::new();

        if self.id.trim().is_empty() {
            issues.push(StructuralIssue::EmptyId);
        }

        let self_reference = |field| StructuralIssue::SelfReference {
            mod_id: self.id.clone(),
            field,
        };
        if self.dependencies.iter().any(|d| d.mod_id == self.id) {
            issues.push(self_reference(ReferenceField::Dependencies));
        }
        if self.load_after.contains(&self.id) {
            issues.push(self_reference(ReferenceField::LoadAfter));
        }
        if self.load_before.contains(&self.id) {
            issues.push(self_reference(ReferenceField::LoadBefore));
        }

        if let Err(e) = Version::parse(&self.version) {
            issues.push(StructuralIssue::MalformedVersion {
                mod_id: self.id.clone(),
                version: self.version.clone(),
                reason: e.to_string(),
            });
        }

        for dep in &self.dependencies {
            if let Err(e) = dep.version_req() {
                issues.push(StructuralIssue::MalformedVersionRange {
                    mod_id: self.id.clone(),
                    dependency: dep.mod_id.clone(),
                    range: dep.version_range.clone().unwrap_or_default(),
                    reason: e.to_string(),
                });
            }
        }

        issues
    }

    /// Whether the manifest passes every structural check.
    pub fn is_well_formed(&self) -> bool {
        self.structural_issues().is_empty()
    }
}

impl FromStr for ModManifest {
    type Err = ManifestError;

    fn from_str(content: &str) -> ManifestResult<Self> {
        let file: ManifestFile = toml::from_str(content)?;
        Ok(file.into())
    }
}

/// Builder for manifests constructed in code (hosts with built-in mods, tests).
#[derive(Debug, Clone)]
pub struct ModManifestBuilder {
    manifest: ModManifest,
}

impl ModManifestBuilder {
    fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            manifest: ModManifest {
                name: id.clone(),
                id,
                author: String::new(),
                description: String::new(),
                version: version.into(),
                dependencies: Vec::new(),
                load_after: BTreeSet::new(),
                load_before: BTreeSet::new(),
                incompatible_with: Vec::new(),
                capabilities: CapabilitySet::new(),
                entry_point: None,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.manifest.name = name.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.manifest.author = author.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.manifest.description = description.into();
        self
    }

    pub fn dependency(mut self, dependency: DependencySpec) -> Self {
        self.manifest.dependencies.push(dependency);
        self
    }

    pub fn depends_on(self, mod_id: impl Into<String>) -> Self {
        self.dependency(DependencySpec::required(mod_id))
    }

    pub fn load_after(mut self, mod_id: impl Into<String>) -> Self {
        self.manifest.load_after.insert(mod_id.into());
        self
    }

    pub fn load_before(mut self, mod_id: impl Into<String>) -> Self {
        self.manifest.load_before.insert(mod_id.into());
        self
    }

    pub fn incompatible_with(mut self, mod_id: impl Into<String>, reason: impl Into<String>) -> Self {
        self.manifest.incompatible_with.push(Incompatibility {
            mod_id: mod_id.into(),
            reason: reason.into(),
        });
        self
    }

    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.manifest.capabilities = capabilities;
        self
    }

    pub fn entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.manifest.entry_point = Some(entry_point.into());
        self
    }

    pub fn build(self) -> ModManifest {
        self.manifest
    }
}

/// On-disk layout of `mod.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestFile {
    /// Requested capabilities.
    #[serde(default)]
    capabilities: Vec<String>,

    #[serde(rename = "mod")]
    info: ModSection,

    #[serde(default)]
    dependencies: Vec<DependencySpec>,

    #[serde(default)]
    ordering: OrderingSection,

    #[serde(default)]
    incompatible: Vec<Incompatibility>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModSection {
    id: String,

    #[serde(default)]
    name: Option<String>,

    version: String,

    #[serde(default)]
    author: String,

    #[serde(default)]
    description: String,

    #[serde(default)]
    entry_point: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OrderingSection {
    #[serde(default)]
    after: BTreeSet<String>,

    #[serde(default)]
    before: BTreeSet<String>,
}

impl From<ManifestFile> for ModManifest {
    fn from(file: ManifestFile) -> Self {
        let ManifestFile {
            capabilities,
            info,
            dependencies,
            ordering,
            incompatible,
        } = file;

        ModManifest {
            name: info.name.unwrap_or_else(|| info.id.clone()),
            id: info.id,
            author: info.author,
            description: info.description,
            version: info.version,
            dependencies,
            load_after: ordering.after,
            load_before: ordering.before,
            incompatible_with: incompatible,
            capabilities: CapabilitySet::from_strings(&capabilities),
            entry_point: info.entry_point,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;

    #[test]
    fn test_parse_manifest() {
        let toml = r#"
capabilities = ["events", "patching"]

[mod]
id = "better-ui"
name = "Better UI"
version = "1.2.0"
author = "someone"
entry_point = "better_ui.wasm"

[[dependencies]]
id = "core-lib"
version = ">=1.0.0, <2.0.0"

[[dependencies]]
id = "themes"
optional = true

[ordering]
after = ["fonts"]
before = ["late"]

[[incompatible]]
id = "old-ui"
reason = "replaces the same widgets"
"#;

        let manifest: ModManifest = toml.parse().unwrap();
        assert_eq!(manifest.id(), "better-ui");
        assert_eq!(manifest.name(), "Better UI");
        assert_eq!(manifest.semantic_version(), Some(Version::new(1, 2, 0)));
        assert_eq!(manifest.dependencies().len(), 2);
        assert!(!manifest.dependencies()[0].optional);
        assert!(manifest.dependencies()[1].optional);
        assert!(manifest.load_after().contains("fonts"));
        assert!(manifest.load_before().contains("late"));
        assert_eq!(manifest.incompatible_with()[0].mod_id, "old-ui");
        assert!(manifest.capabilities().has(&Capability::Patching));
        assert_eq!(manifest.entry_point(), Some("better_ui.wasm"));
        assert!(manifest.is_well_formed());
    }

    #[test]
    fn test_name_defaults_to_id() {
        let manifest: ModManifest = "[mod]\nid = \"plain\"\nversion = \"0.1.0\"\n"
            .parse()
            .unwrap();
        assert_eq!(manifest.name(), "plain");
        assert!(manifest.dependencies().is_empty());
    }

    #[test]
    fn test_missing_mod_table_is_parse_error() {
        let result = "capabilities = []".parse::<ModManifest>();
        assert!(matches!(result, Err(ManifestError::Toml(_))));
    }

    #[test]
    fn test_structural_issues() {
        let manifest = ModManifest::builder("loop", "not-a-version")
            .depends_on("loop")
            .load_before("loop")
            .dependency(DependencySpec::required("other").with_version(">>1"))
            .build();

        let issues = manifest.structural_issues();
        assert!(issues.contains(&StructuralIssue::SelfReference {
            mod_id: "loop".to_string(),
            field: ReferenceField::Dependencies,
        }));
        assert!(issues.contains(&StructuralIssue::SelfReference {
            mod_id: "loop".to_string(),
            field: ReferenceField::LoadBefore,
        }));
        assert!(issues
            .iter()
            .any(|i| matches!(i, StructuralIssue::MalformedVersion { .. })));
        assert!(issues
            .iter()
            .any(|i| matches!(i, StructuralIssue::MalformedVersionRange { dependency, .. } if dependency == "other")));
    }

    #[test]
    fn test_empty_id_is_structural_issue() {
        let manifest = ModManifest::builder("", "1.0.0").build();
        assert_eq!(manifest.structural_issues(), vec![StructuralIssue::EmptyId]);
    }
}
