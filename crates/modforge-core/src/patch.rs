//! Runtime patching of host methods.
//!
//! Mods attach hooks to named host methods. Every target has one immutable
//! [`PatchChain`]; applying or removing a patch builds a new chain and
//! installs it on the target, so an invocation that already took a snapshot
//! finishes against the chain it started with.
//!
//! Within a chain, patches are ordered by priority (highest first) and then
//! by the order they were applied. When a method is called:
//!
//! 1. `Before` hooks run in chain order. They may edit the arguments, set a
//!    result, or return [`HookResult::Skip`] to skip the method body.
//! 2. The first `Replace` hook runs instead of the original method, if any.
//! 3. `After` hooks run in chain order and may edit the result.

use crate::error::PatchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Name of an interceptable host method, e.g. `"ui::draw_menu"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodSignature(String);

impl MethodSignature {
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MethodSignature {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of an applied patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchId(u64);

impl PatchId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "patch#{}", self.0)
    }
}

/// How a patch intercepts its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptionKind {
    Before,
    After,
    Replace,
}

impl fmt::Display for InterceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterceptionKind::Before => "before",
            InterceptionKind::After => "after",
            InterceptionKind::Replace => "replace",
        };
        f.write_str(s)
    }
}

/// Arguments and result of one method call, as seen by hooks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallFrame {
    pub args: Vec<Value>,
    pub result: Option<Value>,
}

impl CallFrame {
    pub fn new(args: Vec<Value>) -> Self {
        Self { args, result: None }
    }
}

/// What a hook asks the chain to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResult {
    /// Continue with normal execution.
    Continue,
    /// From a `Before` hook: skip the method body and the remaining `Before` hooks.
    Skip,
}

/// A patch body.
pub trait PatchHook: Send + Sync {
    fn call(&self, frame: &mut CallFrame) -> HookResult;
}

impl<F> PatchHook for F
where
    F: Fn(&mut CallFrame) -> HookResult + Send + Sync,
{
    fn call(&self, frame: &mut CallFrame) -> HookResult {
        self(frame)
    }
}

/// One applied patch.
pub struct PatchRecord {
    pub id: PatchId,
    pub target: MethodSignature,
    pub owner: String,
    pub kind: InterceptionKind,
    pub priority: i32,
    /// Monotonic application sequence number.
    pub applied_at: u64,
    hook: Arc<dyn PatchHook>,
}

impl fmt::Debug for PatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchRecord")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("owner", &self.owner)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("applied_at", &self.applied_at)
            .finish_non_exhaustive()
    }
}

/// Immutable, ordered set of patches on one target.
#[derive(Debug, Clone)]
pub struct PatchChain {
    target: MethodSignature,
    patches: Vec<Arc<PatchRecord>>,
}

impl PatchChain {
    /// An empty chain: calls go straight to the original method.
    pub fn empty(target: MethodSignature) -> Self {
        Self {
            target,
            patches: Vec::new(),
        }
    }

    fn with_patches(target: MethodSignature, mut patches: Vec<Arc<PatchRecord>>) -> Self {
        patches.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.applied_at.cmp(&b.applied_at))
        });
        Self { target, patches }
    }

    pub fn target(&self) -> &MethodSignature {
        &self.target
    }

    /// Patches in execution order.
    pub fn patches(&self) -> &[Arc<PatchRecord>] {
        &self.patches
    }

    pub fn ids(&self) -> Vec<PatchId> {
        self.patches.iter().map(|p| p.id).collect()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    fn of_kind(&self, kind: InterceptionKind) -> impl Iterator<Item = &Arc<PatchRecord>> {
        self.patches.iter().filter(move |p| p.kind == kind)
    }

    /// The `Replace` patch that runs, if any.
    pub fn replacement(&self) -> Option<&Arc<PatchRecord>> {
        self.of_kind(InterceptionKind::Replace).next()
    }

    /// Run the chain around `original`.
    ///
    /// A replacement or skipped call yields whatever the hooks left in
    /// [`CallFrame::result`], or `Value::Null`.
    pub fn invoke<F>(&self, args: Vec<Value>, original: F) -> Value
    where
        F: FnOnce(&[Value]) -> Value,
    {
        let mut frame = CallFrame::new(args);

        let mut skipped = false;
        for patch in self.of_kind(InterceptionKind::Before) {
            if patch.hook.call(&mut frame) == HookResult::Skip {
                skipped = true;
                break;
            }
        }

        if !skipped {
            match self.replacement() {
                Some(patch) => {
                    patch.hook.call(&mut frame);
                }
                None => frame.result = Some(original(&frame.args)),
            }
        }

        for patch in self.of_kind(InterceptionKind::After) {
            patch.hook.call(&mut frame);
        }

        frame.result.unwrap_or(Value::Null)
    }
}

/// A host method that can receive patch chains.
pub trait InterceptionTarget: Send + Sync {
    /// Swap in a new chain. Calls already running keep their snapshot.
    fn install(&self, chain: Arc<PatchChain>);
}

/// Maps method signatures to interception targets.
pub trait InterceptionResolver: Send + Sync {
    fn resolve(&self, target: &MethodSignature) -> Option<Arc<dyn InterceptionTarget>>;
}

type OriginalFn = dyn Fn(&[Value]) -> Value + Send + Sync;

/// A patchable method living in the host process.
pub struct HostMethod {
    signature: MethodSignature,
    original: Box<OriginalFn>,
    chain: RwLock<Arc<PatchChain>>,
}

impl HostMethod {
    /// Snapshot the current chain and run it.
    pub fn invoke(&self, args: Vec<Value>) -> Value {
        let chain = self.snapshot();
        chain.invoke(args, |args| (self.original)(args))
    }

    pub fn snapshot(&self) -> Arc<PatchChain> {
        Arc::clone(&self.chain.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }
}

impl InterceptionTarget for HostMethod {
    fn install(&self, chain: Arc<PatchChain>) {
        *self.chain.write().unwrap_or_else(PoisonError::into_inner) = chain;
    }
}

/// In-process table of patchable host methods.
#[derive(Default)]
pub struct HostMethodTable {
    methods: RwLock<HashMap<MethodSignature, Arc<HostMethod>>>,
}

impl HostMethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a host method for patching. Re-registering replaces the original
    /// body; patches already installed on it stay in place.
    pub fn register<F>(&self, signature: impl Into<MethodSignature>, original: F)
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        let signature = signature.into();
        let mut methods = self.methods.write().unwrap_or_else(PoisonError::into_inner);
        let chain = match methods.get(&signature) {
            Some(previous) => previous.snapshot(),
            None => Arc::new(PatchChain::empty(signature.clone())),
        };
        debug!(method = %signature, patches = chain.len(), "Registered host method");
        let method = Arc::new(HostMethod {
            chain: RwLock::new(chain),
            original: Box::new(original),
            signature: signature.clone(),
        });
        methods.insert(signature, method);
    }

    pub fn get(&self, signature: &MethodSignature) -> Option<Arc<HostMethod>> {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(signature)
            .cloned()
    }

    /// Call a method through its current chain.
    pub fn invoke(&self, signature: &MethodSignature, args: Vec<Value>) -> Result<Value, PatchError> {
        let method = self
            .get(signature)
            .ok_or_else(|| PatchError::UnknownTarget(signature.clone()))?;
        Ok(method.invoke(args))
    }
}

impl InterceptionResolver for HostMethodTable {
    fn resolve(&self, target: &MethodSignature) -> Option<Arc<dyn InterceptionTarget>> {
        self.get(target).map(|m| m as Arc<dyn InterceptionTarget>)
    }
}

#[derive(Default)]
struct PatchState {
    chains: HashMap<MethodSignature, Arc<PatchChain>>,
    index: HashMap<PatchId, MethodSignature>,
    sequence: u64,
}

/// Owns every applied patch and keeps targets in sync with them.
pub struct PatchManager {
    resolver: Arc<dyn InterceptionResolver>,
    state: RwLock<PatchState>,
}

impl PatchManager {
    pub fn new(resolver: Arc<dyn InterceptionResolver>) -> Self {
        Self {
            resolver,
            state: RwLock::new(PatchState::default()),
        }
    }

    /// Attach a hook to `target` on behalf of `owner`.
    ///
    /// A second `Replace` from a different mod is refused. The same mod may
    /// stack replacements; only the first in chain order runs.
    pub fn apply(
        &self,
        owner: &str,
        target: MethodSignature,
        kind: InterceptionKind,
        priority: i32,
        hook: Arc<dyn PatchHook>,
    ) -> Result<PatchId, PatchError> {
        let interception = self
            .resolver
            .resolve(&target)
            .ok_or_else(|| PatchError::UnknownTarget(target.clone()))?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let current = state.chains.get(&target).cloned();

        if kind == InterceptionKind::Replace {
            if let Some(existing) = current.as_ref().and_then(|c| {
                c.of_kind(InterceptionKind::Replace)
                    .find(|p| p.owner != owner)
                    .cloned()
            }) {
                return Err(PatchError::Conflict {
                    target,
                    existing_owner: existing.owner.clone(),
                    owner: owner.to_string(),
                });
            }
        }

        state.sequence += 1;
        let id = PatchId(state.sequence);
        let record = Arc::new(PatchRecord {
            id,
            target: target.clone(),
            owner: owner.to_string(),
            kind,
            priority,
            applied_at: state.sequence,
            hook,
        });

        let mut patches = current.map(|c| c.patches.clone()).unwrap_or_default();
        patches.push(record);
        let chain = Arc::new(PatchChain::with_patches(target.clone(), patches));

        interception.install(Arc::clone(&chain));
        state.chains.insert(target.clone(), chain);
        state.index.insert(id, target.clone());

        info!(mod_id = %owner, %target, %kind, priority, "Applied {}", id);
        Ok(id)
    }

    /// Remove one patch.
    pub fn remove(&self, patch_id: PatchId) -> Result<(), PatchError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let target = state
            .index
            .remove(&patch_id)
            .ok_or(PatchError::PatchNotFound(patch_id))?;

        self.rebuild(&mut state, &target, |p| p.id != patch_id);
        debug!(%target, "Removed {}", patch_id);
        Ok(())
    }

    /// Remove every patch owned by `owner`. Returns how many were removed.
    pub fn remove_all_for_mod(&self, owner: &str) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let mut targets: Vec<MethodSignature> = state
            .chains
            .iter()
            .filter(|(_, chain)| chain.patches.iter().any(|p| p.owner == owner))
            .map(|(target, _)| target.clone())
            .collect();
        targets.sort();

        let before = state.index.len();
        for target in &targets {
            self.rebuild(&mut state, target, |p| p.owner != owner);
        }
        let removed = before - state.index.len();

        if removed > 0 {
            info!(mod_id = %owner, "Rolled back {} patches", removed);
        }
        removed
    }

    /// Replace `target`'s chain with the patches that satisfy `keep`.
    fn rebuild<F>(&self, state: &mut PatchState, target: &MethodSignature, keep: F)
    where
        F: Fn(&PatchRecord) -> bool,
    {
        let Some(current) = state.chains.get(target).cloned() else {
            return;
        };

        let (kept, dropped): (Vec<_>, Vec<_>) =
            current.patches.iter().cloned().partition(|p| keep(p));
        for patch in &dropped {
            state.index.remove(&patch.id);
        }

        let chain = Arc::new(PatchChain::with_patches(target.clone(), kept));
        if let Some(interception) = self.resolver.resolve(target) {
            interception.install(Arc::clone(&chain));
        }

        if chain.is_empty() {
            state.chains.remove(target);
        } else {
            state.chains.insert(target.clone(), chain);
        }
    }

    /// Current chain for `target`.
    pub fn chain(&self, target: &MethodSignature) -> Arc<PatchChain> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chains
            .get(target)
            .cloned()
            .unwrap_or_else(|| Arc::new(PatchChain::empty(target.clone())))
    }

    /// Owner and kind of every patch on `target`, in chain order.
    ///
    /// Stacking hooks from several mods is allowed; this is for tooling that
    /// wants to see who touches a method.
    pub fn detect_conflicts(&self, target: &MethodSignature) -> Vec<(String, InterceptionKind)> {
        self.chain(target)
            .patches
            .iter()
            .map(|p| (p.owner.clone(), p.kind))
            .collect()
    }

    /// Ids of the patches `owner` currently holds, in application order.
    pub fn patches_of(&self, owner: &str) -> Vec<PatchId> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<PatchId> = state
            .chains
            .values()
            .flat_map(|chain| chain.patches.iter())
            .filter(|p| p.owner == owner)
            .map(|p| p.id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of live patches.
    pub fn patch_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .index
            .len()
    }
}
