//! Code module seam.
//!
//! The lifecycle manager never knows how mod code is produced: a
//! [`CodeModuleLoader`] turns a manifest and its artifact into a live
//! [`CodeModule`], and takes it back on unload.

use crate::context::ModContext;
use anyhow::anyhow;
use modforge_manifest::{ArtifactLocator, ModManifest};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Live code of one mod.
pub trait CodeModule: Send {
    /// Called once when the mod becomes active.
    fn initialize(&mut self, ctx: &mut ModContext<'_>) -> anyhow::Result<()>;

    /// Called before the mod is unloaded. Errors are logged, not fatal.
    fn shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Produces code modules from artifacts.
pub trait CodeModuleLoader: Send + Sync {
    fn load(
        &self,
        manifest: &ModManifest,
        artifact: &ArtifactLocator,
    ) -> anyhow::Result<Box<dyn CodeModule>>;

    /// Release a module. The default just drops it.
    fn unload(&self, module: Box<dyn CodeModule>) {
        drop(module);
    }
}

type ModuleFactory = Box<dyn Fn(&ModManifest) -> anyhow::Result<Box<dyn CodeModule>> + Send + Sync>;

/// Loader for mods compiled into the host, keyed by mod id.
#[derive(Default)]
pub struct StaticModuleLoader {
    factories: RwLock<HashMap<String, ModuleFactory>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory used for `mod_id`.
    pub fn register<F>(&self, mod_id: impl Into<String>, factory: F)
    where
        F: Fn(&ModManifest) -> anyhow::Result<Box<dyn CodeModule>> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(mod_id.into(), Box::new(factory));
    }

    pub fn contains(&self, mod_id: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(mod_id)
    }
}

impl CodeModuleLoader for StaticModuleLoader {
    fn load(
        &self,
        manifest: &ModManifest,
        _artifact: &ArtifactLocator,
    ) -> anyhow::Result<Box<dyn CodeModule>> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let factory = factories
            .get(manifest.id())
            .ok_or_else(|| anyhow!("no built-in module registered for '{}'", manifest.id()))?;
        factory(manifest)
    }
}
