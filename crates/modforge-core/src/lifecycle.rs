//! Mod lifecycle management.
//!
//! The [`ModLifecycleManager`] owns one record per registered mod and drives
//! it through
//!
//! ```text
//! Discovered -> Validated -> Loaded -> Active -> Unloaded
//! ```
//!
//! with `Failed` reachable from every non-terminal state. Each record has its
//! own mutex so transitions of one mod are serialized while independent mods
//! can be started from different threads. A mod never loads before its hard
//! dependencies are active.
//!
//! Lock order: a thread holding a record may lock records earlier in load
//! order, never later ones.

use crate::context::{ModContext, ScriptHost};
use crate::error::{FailureReason, LifecycleError};
use crate::events::EventBus;
use crate::graph::DependencyGraph;
use crate::module::{CodeModule, CodeModuleLoader};
use crate::patch::{PatchId, PatchManager};
use crate::resolver::Resolver;
use crate::services::ServiceRegistry;
use modforge_manifest::{ArtifactLocator, DiscoveredMod, ModManifest};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Where a mod is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Discovered,
    Validated,
    Loaded,
    Active,
    Unloaded,
    Failed(FailureReason),
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Discovered => "discovered",
            LifecycleState::Validated => "validated",
            LifecycleState::Loaded => "loaded",
            LifecycleState::Active => "active",
            LifecycleState::Unloaded => "unloaded",
            LifecycleState::Failed(_) => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LifecycleState::Failed(_))
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Failed(reason) => write!(f, "failed ({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Lifecycle manager settings.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Longest an `initialize` hook may take before the mod is failed.
    /// `None` disables the check.
    pub init_timeout: Option<Duration>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            init_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Read-only snapshot of one mod.
#[derive(Debug, Clone)]
pub struct ModInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub state: LifecycleState,
    pub source: PathBuf,
    pub patches: Vec<PatchId>,
    pub capabilities: Vec<String>,
}

/// Outcome of [`ModLifecycleManager::load_all`].
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    /// Accepted load order.
    pub order: Vec<String>,
    /// Mods that ended up active, in load order.
    pub active: Vec<String>,
    /// Mods that failed, sorted by id.
    pub failed: Vec<(String, FailureReason)>,
}

struct ModRecord {
    manifest: ModManifest,
    artifact: ArtifactLocator,
    source: PathBuf,
    state: LifecycleState,
    module: Option<Box<dyn CodeModule>>,
    patches: Vec<PatchId>,
}

#[derive(Default)]
struct Resolution {
    order: Vec<String>,
    graph: DependencyGraph,
}

/// Result of checking a mod's hard dependencies.
enum Gate {
    Ready,
    NotReady(String),
    Failed(String),
}

type RecordRef = Arc<Mutex<ModRecord>>;

fn lock(record: &Mutex<ModRecord>) -> MutexGuard<'_, ModRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry and state machine for every mod in the host.
pub struct ModLifecycleManager {
    config: LifecycleConfig,
    loader: Arc<dyn CodeModuleLoader>,
    patches: Arc<PatchManager>,
    services: ServiceRegistry,
    events: EventBus,
    script_host: Option<Arc<dyn ScriptHost>>,
    records: RwLock<BTreeMap<String, RecordRef>>,
    resolution: RwLock<Resolution>,
}

impl ModLifecycleManager {
    pub fn new(loader: Arc<dyn CodeModuleLoader>, patches: Arc<PatchManager>) -> Self {
        Self {
            config: LifecycleConfig::default(),
            loader,
            patches,
            services: ServiceRegistry::new(),
            events: EventBus::new(),
            script_host: None,
            records: RwLock::new(BTreeMap::new()),
            resolution: RwLock::new(Resolution::default()),
        }
    }

    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_script_host(mut self, host: Arc<dyn ScriptHost>) -> Self {
        self.script_host = Some(host);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn patch_manager(&self) -> &Arc<PatchManager> {
        &self.patches
    }

    // ------------------------------------------------------------------
    // Registration and validation
    // ------------------------------------------------------------------

    /// Add a discovered mod in state `Discovered`.
    pub fn register(&self, discovered: DiscoveredMod) -> Result<(), LifecycleError> {
        let DiscoveredMod {
            manifest,
            artifact,
            source,
        } = discovered;
        let id = manifest.id().to_string();

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&id) {
            return Err(LifecycleError::DuplicateModId(id));
        }

        debug!(mod_id = %id, version = %manifest.version(), "Registered mod");
        records.insert(
            id,
            Arc::new(Mutex::new(ModRecord {
                manifest,
                artifact,
                source,
                state: LifecycleState::Discovered,
                module: None,
                patches: Vec::new(),
            })),
        );
        Ok(())
    }

    /// Register a manifest built in code.
    pub fn register_manifest(&self, manifest: ModManifest) -> Result<(), LifecycleError> {
        self.register(DiscoveredMod::in_memory(manifest))
    }

    /// Structurally check every `Discovered` mod, then resolve a load order.
    ///
    /// Mods implicated in resolution errors are failed and resolution is
    /// retried on the rest; mods whose required dependencies failed are
    /// failed with [`FailureReason::DependencyFailed`]. Returns the accepted
    /// load order.
    pub fn validate_all(&self) -> Result<Vec<String>, LifecycleError> {
        let records = self.snapshot();

        for (id, record) in &records {
            let mut rec = lock(record);
            if rec.state != LifecycleState::Discovered {
                continue;
            }
            let issues = rec.manifest.structural_issues();
            if issues.is_empty() {
                rec.state = LifecycleState::Validated;
                debug!(mod_id = %id, "Mod validated");
            } else {
                let reason = issues
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                self.fail(id, &mut rec, FailureReason::Malformed(reason));
            }
        }

        loop {
            self.propagate_dependency_failures(&records);

            let candidates: Vec<ModManifest> = records
                .iter()
                .filter_map(|(_, record)| {
                    let rec = lock(record);
                    let live = matches!(
                        rec.state,
                        LifecycleState::Validated | LifecycleState::Loaded | LifecycleState::Active
                    );
                    if live {
                        Some(rec.manifest.clone())
                    } else {
                        None
                    }
                })
                .collect();

            let diagnosis = Resolver::diagnose(&candidates);
            if let Some(order) = diagnosis.order {
                info!("Resolved load order for {} mods", order.len());
                debug!("Load order: {}", order.join(", "));
                let mut resolution = self.resolution.write().unwrap_or_else(PoisonError::into_inner);
                resolution.order = order.clone();
                resolution.graph = diagnosis.graph;
                return Ok(order);
            }

            let mut progressed = false;
            for resolution_error in &diagnosis.errors {
                let implicated = resolution_error.implicated();
                let all_live = implicated.iter().all(|id| {
                    records.get(id).is_some_and(|record| {
                        matches!(
                            lock(record).state,
                            LifecycleState::Loaded | LifecycleState::Active
                        )
                    })
                });
                // a running mod is never failed for a newcomer; blame the newcomer
                let blamed = if all_live {
                    resolution_error.involved()
                } else {
                    implicated
                };
                for id in blamed {
                    let Some(record) = records.get(&id) else {
                        continue;
                    };
                    let mut rec = lock(record);
                    if rec.state == LifecycleState::Validated {
                        self.fail(
                            &id,
                            &mut rec,
                            FailureReason::Resolution(resolution_error.clone()),
                        );
                        progressed = true;
                    }
                }
            }

            if !progressed {
                // only mods that are already live are implicated
                let first = diagnosis.errors.into_iter().next();
                return match first {
                    Some(e) => Err(LifecycleError::Unresolvable(e)),
                    None => Ok(Vec::new()),
                };
            }
        }
    }

    /// Fail `Validated` mods whose required dependencies are failed or unloaded,
    /// until nothing changes.
    fn propagate_dependency_failures(&self, records: &BTreeMap<String, RecordRef>) {
        loop {
            let states: HashMap<&str, LifecycleState> = records
                .iter()
                .map(|(id, record)| (id.as_str(), lock(record).state.clone()))
                .collect();

            let mut doomed = Vec::new();
            for (id, record) in records {
                if states.get(id.as_str()) != Some(&LifecycleState::Validated) {
                    continue;
                }
                let rec = lock(record);
                let broken = rec.manifest.dependencies().iter().find(|dep| {
                    !dep.optional
                        && matches!(
                            states.get(dep.mod_id.as_str()),
                            Some(LifecycleState::Failed(_) | LifecycleState::Unloaded)
                        )
                });
                if let Some(dep) = broken {
                    doomed.push((id.clone(), dep.mod_id.clone()));
                }
            }

            if doomed.is_empty() {
                return;
            }
            for (id, dependency_id) in doomed {
                if let Some(record) = records.get(&id) {
                    let mut rec = lock(record);
                    if rec.state == LifecycleState::Validated {
                        self.fail(&id, &mut rec, FailureReason::DependencyFailed { dependency_id });
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Validated -> Loaded.
    pub fn load(&self, id: &str) -> Result<(), LifecycleError> {
        let record = self.record(id)?;
        let mut rec = lock(&record);

        if rec.state != LifecycleState::Validated {
            return Err(invalid(id, &rec.state, "load"));
        }
        if !self.in_load_order(id) {
            return Err(LifecycleError::NotInLoadOrder(id.to_string()));
        }

        match self.dependency_gate(id, &rec.manifest) {
            Gate::Ready => {}
            Gate::NotReady(dependency_id) => {
                return Err(LifecycleError::DependencyNotReady {
                    mod_id: id.to_string(),
                    dependency_id,
                })
            }
            Gate::Failed(dependency_id) => {
                return Err(self.fail(id, &mut rec, FailureReason::DependencyFailed { dependency_id }))
            }
        }

        match self.loader.load(&rec.manifest, &rec.artifact) {
            Ok(module) => {
                rec.module = Some(module);
                rec.state = LifecycleState::Loaded;
                info!(mod_id = %id, version = %rec.manifest.version(), "Mod loaded");
                Ok(())
            }
            Err(e) => Err(self.fail(id, &mut rec, FailureReason::LoadFailure(format!("{:#}", e)))),
        }
    }

    /// Loaded -> Active: run the mod's `initialize` hook.
    ///
    /// On error or timeout everything the hook registered is rolled back,
    /// the module is released and the mod is failed.
    pub fn activate(&self, id: &str) -> Result<(), LifecycleError> {
        let record = self.record(id)?;
        let mut rec = lock(&record);

        if rec.state != LifecycleState::Loaded {
            return Err(invalid(id, &rec.state, "activate"));
        }

        match self.dependency_gate(id, &rec.manifest) {
            Gate::Ready => {}
            Gate::NotReady(dependency_id) => {
                return Err(LifecycleError::DependencyNotReady {
                    mod_id: id.to_string(),
                    dependency_id,
                })
            }
            Gate::Failed(dependency_id) => {
                return Err(self.fail(id, &mut rec, FailureReason::DependencyFailed { dependency_id }))
            }
        }

        let Some(mut module) = rec.module.take() else {
            return Err(self.fail(
                id,
                &mut rec,
                FailureReason::LoadFailure("code module missing".to_string()),
            ));
        };

        let capabilities = rec.manifest.capabilities().clone();
        let mut ctx = ModContext::new(
            id,
            &capabilities,
            &self.services,
            &self.events,
            &self.patches,
            self.script_host.clone(),
            self.visible_providers(id),
        );

        let started = Instant::now();
        let outcome = module.initialize(&mut ctx);
        let elapsed = started.elapsed();

        let outcome = match (outcome, self.config.init_timeout) {
            (Err(e), _) => Err(format!("{:#}", e)),
            (Ok(()), Some(limit)) if elapsed > limit => Err(format!(
                "took {}ms, limit is {}ms",
                elapsed.as_millis(),
                limit.as_millis()
            )),
            (Ok(()), _) => Ok(()),
        };

        match outcome {
            Ok(()) => {
                rec.module = Some(module);
                rec.patches = self.patches.patches_of(id);
                rec.state = LifecycleState::Active;
                info!(
                    mod_id = %id,
                    patches = rec.patches.len(),
                    services = self.services.provided_by(id).len(),
                    "Mod active"
                );
                Ok(())
            }
            Err(reason) => {
                self.rollback(id);
                self.loader.unload(module);
                Err(self.fail(id, &mut rec, FailureReason::InitializationFailure(reason)))
            }
        }
    }

    /// Load and activate.
    pub fn start(&self, id: &str) -> Result<(), LifecycleError> {
        self.load(id)?;
        self.activate(id)
    }

    /// Validate everything, then start every mod in load order.
    ///
    /// A failing mod does not stop independent mods from starting.
    pub fn load_all(&self) -> Result<LoadSummary, LifecycleError> {
        let order = self.validate_all()?;
        let mut summary = LoadSummary {
            order: order.clone(),
            ..Default::default()
        };

        for id in &order {
            let result = match self.state(id) {
                Some(LifecycleState::Active) => Ok(()),
                Some(LifecycleState::Validated) => self.start(id),
                Some(LifecycleState::Loaded) => self.activate(id),
                _ => continue,
            };
            match result {
                Ok(()) => summary.active.push(id.clone()),
                Err(e) => warn!(mod_id = %id, "{}", e),
            }
        }

        summary.failed = self
            .snapshot()
            .iter()
            .filter_map(|(id, record)| match &lock(record).state {
                LifecycleState::Failed(reason) => Some((id.clone(), reason.clone())),
                _ => None,
            })
            .collect();

        info!(
            "Loaded {} mods ({} failed)",
            summary.active.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Unload a mod, unloading its loaded dependents first.
    ///
    /// Unloading an `Unloaded` or `Failed` mod does nothing.
    pub fn unload(&self, id: &str) -> Result<(), LifecycleError> {
        self.unload_cascade(id).map(|_| ())
    }

    /// Returns the dependents that were unloaded along with `id`, in the
    /// order they were unloaded.
    fn unload_cascade(&self, id: &str) -> Result<Vec<String>, LifecycleError> {
        let record = self.record(id)?;
        {
            let rec = lock(&record);
            match rec.state {
                LifecycleState::Unloaded | LifecycleState::Failed(_) => return Ok(Vec::new()),
                LifecycleState::Discovered | LifecycleState::Validated => {
                    return Err(invalid(id, &rec.state, "unload"))
                }
                LifecycleState::Loaded | LifecycleState::Active => {}
            }
        }

        let dependents = self.live_dependents(id);
        for dependent in &dependents {
            info!(mod_id = %dependent, dependency = %id, "Unloading dependent");
            self.unload_single(dependent)?;
        }
        self.unload_single(id)?;
        Ok(dependents)
    }

    /// Transitive dependents in `Loaded` or `Active`, in reverse load order.
    fn live_dependents(&self, id: &str) -> Vec<String> {
        let (order, dependents) = {
            let resolution = self.resolution.read().unwrap_or_else(PoisonError::into_inner);
            (
                resolution.order.clone(),
                resolution.graph.transitive_dependents(id),
            )
        };

        order
            .into_iter()
            .rev()
            .filter(|other| dependents.contains(other))
            .filter(|other| {
                matches!(
                    self.state(other),
                    Some(LifecycleState::Loaded | LifecycleState::Active)
                )
            })
            .collect()
    }

    fn unload_single(&self, id: &str) -> Result<(), LifecycleError> {
        let record = self.record(id)?;
        let mut rec = lock(&record);

        let was_active = match rec.state {
            LifecycleState::Active => true,
            LifecycleState::Loaded => false,
            _ => return Ok(()),
        };

        if was_active {
            if let Some(module) = rec.module.as_mut() {
                if let Err(e) = module.shutdown() {
                    warn!(mod_id = %id, "Shutdown hook failed: {:#}", e);
                }
            }
            self.rollback(id);
        }

        if let Some(module) = rec.module.take() {
            self.loader.unload(module);
        }
        rec.patches.clear();
        rec.state = LifecycleState::Unloaded;
        info!(mod_id = %id, "Mod unloaded");
        Ok(())
    }

    /// Unload every mod in reverse load order.
    pub fn shutdown_all(&self) {
        let order = self.load_order();
        info!("Shutting down {} mods", order.len());
        for id in order.iter().rev() {
            if let Err(e) = self.unload_single(id) {
                warn!(mod_id = %id, "Unload failed: {}", e);
            }
        }
    }

    /// Unload, re-check and start a mod with a fresh code module.
    ///
    /// Dependents unloaded on the way are restarted in load order; their
    /// failures are logged and do not fail the reload. A mod that dropped out
    /// of the load order while unloaded is resolved again first. On error
    /// nothing is left half-validated: mods that did not fail go back to
    /// `Unloaded`.
    pub fn reload(&self, id: &str) -> Result<(), LifecycleError> {
        {
            let record = self.record(id)?;
            let rec = lock(&record);
            if !matches!(
                rec.state,
                LifecycleState::Active | LifecycleState::Loaded | LifecycleState::Unloaded
            ) {
                return Err(invalid(id, &rec.state, "reload"));
            }
        }

        let cascaded = self.unload_cascade(id)?;
        info!(mod_id = %id, dependents = cascaded.len(), "Reloading mod");

        self.revalidate(id)?;
        let mut restarting: Vec<String> = Vec::new();
        for dependent in cascaded {
            match self.revalidate(&dependent) {
                Ok(()) => restarting.push(dependent),
                Err(e) => warn!(mod_id = %dependent, "Failed to revalidate dependent: {}", e),
            }
        }

        let placed = self.in_load_order(id) && restarting.iter().all(|d| self.in_load_order(d));
        if !placed {
            debug!(mod_id = %id, "Mod left the load order while unloaded, resolving again");
            if let Err(e) = self.validate_all() {
                self.restore_unloaded(std::iter::once(id).chain(restarting.iter().map(String::as_str)));
                return Err(e);
            }
            if let Some(LifecycleState::Failed(reason)) = self.state(id) {
                self.restore_unloaded(restarting.iter().map(String::as_str));
                return Err(LifecycleError::Failed {
                    mod_id: id.to_string(),
                    reason,
                });
            }
        }

        if let Err(e) = self.start(id) {
            self.restore_unloaded(std::iter::once(id).chain(restarting.iter().map(String::as_str)));
            return Err(e);
        }

        for dependent in self.load_order().iter().filter(|d| restarting.contains(*d)) {
            if let Err(e) = self.start(dependent) {
                warn!(mod_id = %dependent, "Failed to restart dependent: {}", e);
                self.restore_unloaded(std::iter::once(dependent.as_str()));
            }
        }
        Ok(())
    }

    /// Put mods left in `Validated` by an aborted reload back to `Unloaded`.
    fn restore_unloaded<'a>(&self, ids: impl Iterator<Item = &'a str>) {
        for id in ids {
            if let Some(record) = self.find(id) {
                let mut rec = lock(&record);
                if rec.state == LifecycleState::Validated {
                    rec.state = LifecycleState::Unloaded;
                }
            }
        }
    }

    /// Unloaded -> Validated after re-running the structural checks.
    fn revalidate(&self, id: &str) -> Result<(), LifecycleError> {
        let record = self.record(id)?;
        let mut rec = lock(&record);
        if rec.state != LifecycleState::Unloaded {
            return Err(invalid(id, &rec.state, "revalidate"));
        }

        let issues = rec.manifest.structural_issues();
        if let Some(issue) = issues.first() {
            let reason = FailureReason::Malformed(issue.to_string());
            return Err(self.fail(id, &mut rec, reason));
        }
        rec.state = LifecycleState::Validated;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self, id: &str) -> Option<LifecycleState> {
        let record = self.find(id)?;
        let state = lock(&record).state.clone();
        Some(state)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.state(id) == Some(LifecycleState::Active)
    }

    /// Direct hard dependencies of `id` in the accepted graph.
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        self.resolution
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .graph
            .dependencies_of(id)
    }

    /// Mods that directly depend on `id` in the accepted graph.
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.resolution
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .graph
            .dependents_of(id)
    }

    /// Last accepted load order.
    pub fn load_order(&self) -> Vec<String> {
        self.resolution
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .clone()
    }

    /// Snapshot of every registered mod, sorted by id.
    pub fn list_mods(&self) -> Vec<ModInfo> {
        self.snapshot()
            .iter()
            .map(|(id, record)| {
                let rec = lock(record);
                ModInfo {
                    id: id.clone(),
                    name: rec.manifest.name().to_string(),
                    version: rec.manifest.version().to_string(),
                    state: rec.state.clone(),
                    source: rec.source.clone(),
                    patches: rec.patches.clone(),
                    capabilities: rec.manifest.capabilities().names(),
                }
            })
            .collect()
    }

    /// Patches currently owned by `id`.
    pub fn patches_of(&self, id: &str) -> Vec<PatchId> {
        self.patches.patches_of(id)
    }

    pub fn mod_count(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn find(&self, id: &str) -> Option<RecordRef> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn record(&self, id: &str) -> Result<RecordRef, LifecycleError> {
        self.find(id)
            .ok_or_else(|| LifecycleError::UnknownMod(id.to_string()))
    }

    fn snapshot(&self) -> BTreeMap<String, RecordRef> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn in_load_order(&self, id: &str) -> bool {
        self.resolution
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .iter()
            .any(|o| o == id)
    }

    /// Check the hard dependencies of `id`. Optional dependencies only gate
    /// when they are part of the accepted order and have not failed.
    fn dependency_gate(&self, id: &str, manifest: &ModManifest) -> Gate {
        let mut not_ready = None;

        for dep in manifest.dependencies() {
            if dep.mod_id == id {
                continue;
            }
            let Some(record) = self.find(&dep.mod_id) else {
                if dep.optional {
                    continue;
                }
                return Gate::Failed(dep.mod_id.clone());
            };

            let state = lock(&record).state.clone();
            match state {
                LifecycleState::Active => {}
                LifecycleState::Failed(_) | LifecycleState::Unloaded => {
                    if !dep.optional {
                        return Gate::Failed(dep.mod_id.clone());
                    }
                }
                _ => {
                    if !dep.optional || self.in_load_order(&dep.mod_id) {
                        not_ready.get_or_insert_with(|| dep.mod_id.clone());
                    }
                }
            }
        }

        match not_ready {
            Some(dependency_id) => Gate::NotReady(dependency_id),
            None => Gate::Ready,
        }
    }

    /// Active mods before `id` in load order.
    fn visible_providers(&self, id: &str) -> BTreeSet<String> {
        self.load_order()
            .into_iter()
            .take_while(|other| other != id)
            .filter(|other| self.is_active(other))
            .collect()
    }

    /// Drop every patch, service and subscription owned by `id`.
    fn rollback(&self, id: &str) {
        let patches = self.patches.remove_all_for_mod(id);
        let services = self.services.remove_all_for(id);
        let subscriptions = self.events.unsubscribe_all(id);
        debug!(mod_id = %id, patches, services, subscriptions, "Rolled back mod registrations");
    }

    /// Move a record to `Failed`, releasing any module it holds.
    fn fail(&self, id: &str, rec: &mut ModRecord, reason: FailureReason) -> LifecycleError {
        if let Some(module) = rec.module.take() {
            self.loader.unload(module);
        }
        error!(mod_id = %id, "Mod failed: {}", reason);
        rec.state = LifecycleState::Failed(reason.clone());
        LifecycleError::Failed {
            mod_id: id.to_string(),
            reason,
        }
    }
}

fn invalid(id: &str, state: &LifecycleState, operation: &'static str) -> LifecycleError {
    LifecycleError::InvalidTransition {
        mod_id: id.to_string(),
        state: state.clone(),
        operation,
    }
}
