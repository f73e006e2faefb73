//! # modforge-core
//!
//! Mod hosting for modforge.
//!
//! This crate provides:
//!
//! - Deterministic load order resolution with cycle, version and
//!   incompatibility detection ([`Resolver`])
//! - The per-mod state machine and registry ([`ModLifecycleManager`])
//! - Reversible runtime patches on host methods ([`PatchManager`])
//! - Pre-flight validation reports for tooling ([`ValidationEngine`])
//!
//! ## Hosting mods
//!
//! A host exposes patchable methods through a [`HostMethodTable`], supplies
//! a [`CodeModuleLoader`], registers discovered mods and calls
//! [`ModLifecycleManager::load_all`]. Mods reach the host only through the
//! [`ModContext`] passed to [`CodeModule::initialize`], which enforces the
//! capabilities declared in their manifest.

pub mod context;
pub mod error;
pub mod events;
pub mod graph;
pub mod lifecycle;
pub mod module;
pub mod patch;
pub mod resolver;
pub mod services;
pub mod validation;

pub use context::{ModContext, ScriptHost};
pub use error::{ContextError, FailureReason, LifecycleError, PatchError, ResolutionError};
pub use events::{Event, EventBus, EventHandler, SubscriptionId};
pub use graph::{DependencyGraph, EdgeKind};
pub use lifecycle::{LifecycleConfig, LifecycleState, LoadSummary, ModInfo, ModLifecycleManager};
pub use module::{CodeModule, CodeModuleLoader, StaticModuleLoader};
pub use patch::{
    CallFrame, HookResult, HostMethod, HostMethodTable, InterceptionKind, InterceptionResolver,
    InterceptionTarget, MethodSignature, PatchChain, PatchHook, PatchId, PatchManager, PatchRecord,
};
pub use resolver::{Diagnosis, Resolver};
pub use services::{ServiceRegistry, ServiceTag};
pub use validation::{ValidationEngine, ValidationError, ValidationErrorKind, ValidationReport};
