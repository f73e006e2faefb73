//! The context handed to a mod while it initializes.
//!
//! Everything a mod can do to the host goes through here, and every
//! operation checks the capability the mod was granted in its manifest.

use crate::error::ContextError;
use crate::events::{EventBus, EventHandler, SubscriptionId};
use crate::patch::{InterceptionKind, MethodSignature, PatchHook, PatchId, PatchManager};
use crate::services::{ServiceRegistry, ServiceTag};
use modforge_manifest::{Capability, CapabilitySet};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Sandboxed script evaluation provided by the host.
pub trait ScriptHost: Send + Sync {
    /// Evaluate `source` on behalf of `mod_id`.
    fn evaluate(&self, mod_id: &str, source: &str) -> anyhow::Result<Value>;
}

/// Capability-checked view of the host for one mod.
pub struct ModContext<'a> {
    mod_id: &'a str,
    capabilities: &'a CapabilitySet,
    services: &'a ServiceRegistry,
    events: &'a EventBus,
    patches: &'a PatchManager,
    script_host: Option<Arc<dyn ScriptHost>>,
    visible_providers: BTreeSet<String>,
}

impl<'a> ModContext<'a> {
    /// Build a context. `visible_providers` are the mods whose services this
    /// mod may look up: those already active and earlier in load order.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mod_id: &'a str,
        capabilities: &'a CapabilitySet,
        services: &'a ServiceRegistry,
        events: &'a EventBus,
        patches: &'a PatchManager,
        script_host: Option<Arc<dyn ScriptHost>>,
        visible_providers: BTreeSet<String>,
    ) -> Self {
        Self {
            mod_id,
            capabilities,
            services,
            events,
            patches,
            script_host,
            visible_providers,
        }
    }

    pub fn mod_id(&self) -> &str {
        self.mod_id
    }

    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.has(capability)
    }

    fn require(&self, capability: Capability) -> Result<(), ContextError> {
        if self.capabilities.has(&capability) {
            Ok(())
        } else {
            Err(ContextError::CapabilityDenied {
                mod_id: self.mod_id.to_string(),
                capability,
            })
        }
    }

    /// Subscribe to a host event.
    pub fn subscribe(&mut self, event: &str, handler: EventHandler) -> Result<SubscriptionId, ContextError> {
        self.require(Capability::Events)?;
        Ok(self.events.subscribe(self.mod_id, event, handler))
    }

    /// Publish a service for mods loaded after this one.
    pub fn register_service<T>(&mut self, tag: ServiceTag<T>, service: Arc<T>) -> Result<(), ContextError>
    where
        T: Any + Send + Sync,
    {
        self.require(Capability::ProvideServices)?;
        self.services.register(self.mod_id, tag, service)
    }

    /// Look up a service published by an active mod earlier in load order.
    pub fn lookup_service<T>(&self, tag: ServiceTag<T>) -> Result<Arc<T>, ContextError>
    where
        T: Any + Send + Sync,
    {
        self.require(Capability::LookupServices)?;
        let (provider, service) = self.services.lookup(tag)?;
        if provider != self.mod_id && !self.visible_providers.contains(&provider) {
            return Err(ContextError::ServiceNotVisible {
                name: tag.name().to_string(),
                provider,
                mod_id: self.mod_id.to_string(),
            });
        }
        Ok(service)
    }

    /// Patch a host method. The patch is owned by this mod and rolled back
    /// when it unloads or fails to initialize.
    pub fn apply_patch(
        &mut self,
        target: impl Into<MethodSignature>,
        kind: InterceptionKind,
        priority: i32,
        hook: Arc<dyn PatchHook>,
    ) -> Result<PatchId, ContextError> {
        self.require(Capability::Patching)?;
        Ok(self
            .patches
            .apply(self.mod_id, target.into(), kind, priority, hook)?)
    }

    /// The host's script evaluator.
    pub fn script_host(&self) -> Result<Arc<dyn ScriptHost>, ContextError> {
        self.require(Capability::Scripting)?;
        self.script_host.clone().ok_or(ContextError::NoScriptHost)
    }
}
