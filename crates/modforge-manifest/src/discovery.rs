//! Mod discovery.
//!
//! A [`ManifestSource`] turns a mod root into a set of candidate manifests.
//! The directory source expects one sub-directory per mod, each holding a
//! `mod.toml`:
//!
//! ```text
//! mods/
//!   better-ui/
//!     mod.toml
//!     better_ui.wasm
//!   core-lib/
//!     mod.toml
//! ```
//!
//! Discovery never deduplicates ids. Two directories declaring the same id
//! are both returned so that validation can report every offending source.

use crate::error::{ManifestError, ManifestResult};
use crate::manifest::{ModManifest, MANIFEST_FILE_NAME};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a mod's code artifact lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    /// Directory containing the mod.
    pub mod_dir: PathBuf,

    /// Artifact file name relative to `mod_dir`, from the manifest's entry point.
    pub entry_point: Option<PathBuf>,
}

impl ArtifactLocator {
    pub fn new(mod_dir: impl Into<PathBuf>) -> Self {
        Self {
            mod_dir: mod_dir.into(),
            entry_point: None,
        }
    }

    /// Locator for a mod that has no on-disk presence.
    pub fn in_memory() -> Self {
        Self::new(PathBuf::new())
    }

    fn for_manifest(mod_dir: &Path, manifest: &ModManifest) -> Self {
        Self {
            mod_dir: mod_dir.to_path_buf(),
            entry_point: manifest.entry_point().map(PathBuf::from),
        }
    }

    /// Full path to the artifact file, if the manifest names one.
    pub fn entry_point_path(&self) -> Option<PathBuf> {
        self.entry_point.as_ref().map(|p| self.mod_dir.join(p))
    }

    /// Check if the artifact file exists.
    pub fn exists(&self) -> bool {
        self.entry_point_path().is_some_and(|p| p.exists())
    }
}

/// A candidate mod produced by discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredMod {
    /// Parsed manifest.
    pub manifest: ModManifest,

    /// Location of the code artifact.
    pub artifact: ArtifactLocator,

    /// Where the manifest came from, used in reports.
    pub source: PathBuf,
}

impl DiscoveredMod {
    /// Wrap a manifest built in code.
    pub fn in_memory(manifest: ModManifest) -> Self {
        let source = PathBuf::from(format!("<memory>/{}", manifest.id()));
        Self {
            manifest,
            artifact: ArtifactLocator::in_memory(),
            source,
        }
    }

    pub fn id(&self) -> &str {
        self.manifest.id()
    }
}

/// Result of scanning a mod root.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Manifests that parsed, in source order.
    pub mods: Vec<DiscoveredMod>,

    /// Manifests that could not be read or parsed.
    pub failures: Vec<(PathBuf, ManifestError)>,
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a discovery from manifests constructed in code.
    pub fn from_manifests<I>(manifests: I) -> Self
    where
        I: IntoIterator<Item = ModManifest>,
    {
        Self {
            mods: manifests.into_iter().map(DiscoveredMod::in_memory).collect(),
            failures: Vec::new(),
        }
    }

    /// Drop mods whose id is in `disabled`.
    pub fn without<S: AsRef<str>>(mut self, disabled: &[S]) -> Self {
        self.mods
            .retain(|m| !disabled.iter().any(|d| d.as_ref() == m.id()));
        self
    }

    /// Total number of candidates, including unparseable ones.
    pub fn len(&self) -> usize {
        self.mods.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty() && self.failures.is_empty()
    }
}

/// Something that can enumerate candidate mods under a root.
pub trait ManifestSource {
    /// Scan `root`. Per-mod parse failures go into [`Discovery::failures`];
    /// only an unreadable root is an error.
    fn discover(&self, root: &Path) -> ManifestResult<Discovery>;
}

/// Reads `*/mod.toml` under a directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectorySource;

impl DirectorySource {
    pub fn new() -> Self {
        Self
    }
}

impl ManifestSource for DirectorySource {
    fn discover(&self, root: &Path) -> ManifestResult<Discovery> {
        let entries = std::fs::read_dir(root).map_err(|source| ManifestError::RootUnreadable {
            path: root.to_path_buf(),
            source,
        })?;

        // read_dir order is platform dependent
        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        let mut discovery = Discovery::new();
        for dir in dirs {
            let manifest_path = dir.join(MANIFEST_FILE_NAME);
            if !manifest_path.exists() {
                debug!("Skipping {:?}: no {}", dir, MANIFEST_FILE_NAME);
                continue;
            }

            match ModManifest::from_file(&manifest_path) {
                Ok(manifest) => {
                    debug!(
                        mod_id = %manifest.id(),
                        version = %manifest.version(),
                        "Discovered mod at {:?}",
                        dir
                    );
                    discovery.mods.push(DiscoveredMod {
                        artifact: ArtifactLocator::for_manifest(&dir, &manifest),
                        manifest,
                        source: manifest_path,
                    });
                }
                Err(e) => {
                    warn!("Failed to load manifest from {:?}: {}", manifest_path, e);
                    discovery.failures.push((manifest_path, e));
                }
            }
        }

        info!(
            "Discovered {} mods in {:?} ({} unreadable)",
            discovery.mods.len(),
            root,
            discovery.failures.len()
        );
        Ok(discovery)
    }
}

/// Read a single mod directory.
pub fn discover_mod(path: &Path) -> ManifestResult<DiscoveredMod> {
    let manifest_path = path.join(MANIFEST_FILE_NAME);
    let manifest = ModManifest::from_file(&manifest_path)?;

    Ok(DiscoveredMod {
        artifact: ArtifactLocator::for_manifest(path, &manifest),
        manifest,
        source: manifest_path,
    })
}

/// Get the user mods directory.
pub fn user_mods_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "raibid-labs", "modforge")
        .map(|dirs| dirs.data_dir().join("mods"))
}
