//! # modforge-manifest
//!
//! Mod manifests and discovery for modforge.
//!
//! This crate provides:
//! - The immutable [`ModManifest`] model and its `mod.toml` format
//! - Structural checks (non-empty id, no self reference, valid semver)
//! - Capability entitlements requested by mods
//! - [`ManifestSource`] and the on-disk [`DirectorySource`]
//!
//! ## Mod Structure
//!
//! Mods are directories containing:
//! - `mod.toml` - Mod metadata, dependencies, ordering hints and capabilities
//! - the artifact named by `entry_point` (optional)

pub mod capability;
pub mod discovery;
pub mod error;
pub mod manifest;

pub use capability::{Capability, CapabilitySet};
pub use discovery::{
    discover_mod, user_mods_dir, ArtifactLocator, DirectorySource, DiscoveredMod, Discovery,
    ManifestSource,
};
pub use error::{ManifestError, ManifestResult};
pub use manifest::{
    DependencySpec, Incompatibility, ModManifest, ModManifestBuilder, ReferenceField,
    StructuralIssue, MANIFEST_FILE_NAME,
};
