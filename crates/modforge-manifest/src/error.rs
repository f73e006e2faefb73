//! Error types for manifest loading and discovery.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading mod manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// No manifest file at the expected location.
    #[error("Manifest not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The mod root passed to a manifest source could not be read.
    #[error("Mod root unreadable: {}: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for manifest operations.
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;
