//! Error types for resolution, lifecycle, patching and mod contexts.

use crate::lifecycle::LifecycleState;
use crate::patch::{MethodSignature, PatchId};
use modforge_manifest::Capability;
use serde::Serialize;
use thiserror::Error;

/// A problem found while computing a load order.
///
/// These are values, not failures of the resolver: [`crate::Resolver::diagnose`]
/// collects all of them.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionError {
    #[error("mod '{mod_id}' requires missing mod '{missing_id}'")]
    MissingDependency { mod_id: String, missing_id: String },

    #[error("mod '{mod_id}' requires '{dependency_id}' {required}, found {found}")]
    VersionMismatch {
        mod_id: String,
        dependency_id: String,
        required: String,
        found: String,
    },

    #[error("mod '{mod_id}' is incompatible with '{other_id}': {reason}")]
    Incompatible {
        mod_id: String,
        other_id: String,
        reason: String,
    },

    #[error("mod '{mod_id}' depends on '{dependency_id}' but its ordering hints place it first")]
    OrderingConflict {
        mod_id: String,
        dependency_id: String,
    },

    #[error("circular dependency: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

impl ResolutionError {
    /// Every mod named by the error.
    pub fn involved(&self) -> Vec<String> {
        match self {
            ResolutionError::MissingDependency { mod_id, missing_id } => {
                vec![mod_id.clone(), missing_id.clone()]
            }
            ResolutionError::VersionMismatch {
                mod_id,
                dependency_id,
                ..
            }
            | ResolutionError::OrderingConflict {
                mod_id,
                dependency_id,
            } => vec![mod_id.clone(), dependency_id.clone()],
            ResolutionError::Incompatible {
                mod_id, other_id, ..
            } => vec![mod_id.clone(), other_id.clone()],
            ResolutionError::CircularDependency { cycle } => cycle_members(cycle),
        }
    }

    /// The mods that must be excluded for resolution to make progress.
    ///
    /// For an incompatibility this is the declaring mod; for a cycle, every member.
    pub fn implicated(&self) -> Vec<String> {
        match self {
            ResolutionError::MissingDependency { mod_id, .. }
            | ResolutionError::VersionMismatch { mod_id, .. }
            | ResolutionError::Incompatible { mod_id, .. }
            | ResolutionError::OrderingConflict { mod_id, .. } => vec![mod_id.clone()],
            ResolutionError::CircularDependency { cycle } => cycle_members(cycle),
        }
    }
}

/// Distinct ids of a cycle path, whose last element repeats the first.
fn cycle_members(cycle: &[String]) -> Vec<String> {
    let mut members: Vec<String> = Vec::new();
    for id in cycle {
        if !members.contains(id) {
            members.push(id.clone());
        }
    }
    members
}

/// Why a mod ended up in [`LifecycleState::Failed`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("malformed manifest: {0}")]
    Malformed(String),

    #[error("{0}")]
    Resolution(ResolutionError),

    #[error("dependency '{dependency_id}' failed or was unloaded")]
    DependencyFailed { dependency_id: String },

    #[error("failed to load code module: {0}")]
    LoadFailure(String),

    #[error("initialization failed: {0}")]
    InitializationFailure(String),
}

/// Errors returned by [`crate::ModLifecycleManager`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("mod '{0}' is already registered")]
    DuplicateModId(String),

    #[error("mod not found: {0}")]
    UnknownMod(String),

    #[error("cannot {operation} mod '{mod_id}' in state {state}")]
    InvalidTransition {
        mod_id: String,
        state: LifecycleState,
        operation: &'static str,
    },

    #[error("mod '{0}' has no place in the accepted load order")]
    NotInLoadOrder(String),

    #[error("mod '{mod_id}' waits on dependency '{dependency_id}' which is not active yet")]
    DependencyNotReady {
        mod_id: String,
        dependency_id: String,
    },

    #[error("mod '{mod_id}' failed: {reason}")]
    Failed { mod_id: String, reason: FailureReason },

    #[error("unresolvable load order: {0}")]
    Unresolvable(ResolutionError),
}

/// Errors from patch registration and removal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("no interception target for {0}")]
    UnknownTarget(MethodSignature),

    #[error("{target} is already replaced by mod '{existing_owner}', refusing replacement from '{owner}'")]
    Conflict {
        target: MethodSignature,
        existing_owner: String,
        owner: String,
    },

    #[error("patch not found: {0}")]
    PatchNotFound(PatchId),
}

/// Errors raised through a [`crate::ModContext`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("mod '{mod_id}' lacks capability '{capability}'")]
    CapabilityDenied {
        mod_id: String,
        capability: Capability,
    },

    #[error("service '{name}' is already provided by mod '{provider}'")]
    ServiceAlreadyRegistered { name: String, provider: String },

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("service '{name}' from mod '{provider}' is not visible to '{mod_id}'")]
    ServiceNotVisible {
        name: String,
        provider: String,
        mod_id: String,
    },

    #[error("service '{0}' has a different type than requested")]
    ServiceTypeMismatch(String),

    #[error("no script host is available")]
    NoScriptHost,

    #[error(transparent)]
    Patch(#[from] PatchError),
}
