//! Typed services published by mods.
//!
//! A mod publishes a service under a [`ServiceTag`]; mods loaded after it can
//! look the service up by the same tag. The registry itself does not enforce
//! visibility; [`crate::ModContext`] does.

use crate::error::ContextError;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Typed key for a service.
///
/// ```
/// use modforge_core::ServiceTag;
///
/// pub trait Palette: Send + Sync {
///     fn accent(&self) -> u32;
/// }
///
/// pub const PALETTE: ServiceTag<Box<dyn Palette>> = ServiceTag::new("theme.palette");
/// ```
pub struct ServiceTag<T: ?Sized> {
    name: &'static str,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized> ServiceTag<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: ?Sized> Clone for ServiceTag<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for ServiceTag<T> {}

impl<T: ?Sized> fmt::Debug for ServiceTag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceTag").field(&self.name).finish()
    }
}

struct ServiceEntry {
    provider: String,
    service: Arc<dyn Any + Send + Sync>,
}

/// Registry of published services, keyed by tag name.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<&'static str, ServiceEntry>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `service` on behalf of `provider`.
    pub fn register<T>(
        &self,
        provider: &str,
        tag: ServiceTag<T>,
        service: Arc<T>,
    ) -> Result<(), ContextError>
    where
        T: Any + Send + Sync,
    {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = services.get(tag.name) {
            return Err(ContextError::ServiceAlreadyRegistered {
                name: tag.name.to_string(),
                provider: existing.provider.clone(),
            });
        }

        services.insert(
            tag.name,
            ServiceEntry {
                provider: provider.to_string(),
                service,
            },
        );
        debug!(mod_id = %provider, service = tag.name, "Registered service");
        Ok(())
    }

    /// Look up a service and the mod that provides it.
    pub fn lookup<T>(&self, tag: ServiceTag<T>) -> Result<(String, Arc<T>), ContextError>
    where
        T: Any + Send + Sync,
    {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let entry = services
            .get(tag.name)
            .ok_or_else(|| ContextError::ServiceNotFound(tag.name.to_string()))?;

        let service = Arc::clone(&entry.service)
            .downcast::<T>()
            .map_err(|_| ContextError::ServiceTypeMismatch(tag.name.to_string()))?;
        Ok((entry.provider.clone(), service))
    }

    /// Names of the services `provider` publishes, sorted.
    pub fn provided_by(&self, provider: &str) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, e)| e.provider == provider)
            .map(|(name, _)| *name)
            .collect();
        names.sort_unstable();
        names
    }

    /// Drop everything `provider` published. Returns how many were dropped.
    pub fn remove_all_for(&self, provider: &str) -> usize {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let before = services.len();
        services.retain(|_, e| e.provider != provider);
        before - services.len()
    }

    pub fn len(&self) -> usize {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clock(u64);

    const CLOCK: ServiceTag<Clock> = ServiceTag::new("host.clock");
    const WRONG: ServiceTag<String> = ServiceTag::new("host.clock");

    #[test]
    fn test_register_and_lookup() {
        let registry = ServiceRegistry::new();
        registry.register("timer", CLOCK, Arc::new(Clock(7))).unwrap();

        let (provider, clock) = registry.lookup(CLOCK).unwrap();
        assert_eq!(provider, "timer");
        assert_eq!(clock.0, 7);
        assert_eq!(registry.provided_by("timer"), vec!["host.clock"]);
    }

    #[test]
    fn test_duplicate_and_type_mismatch() {
        let registry = ServiceRegistry::new();
        registry.register("timer", CLOCK, Arc::new(Clock(1))).unwrap();

        assert!(matches!(
            registry.register("other", CLOCK, Arc::new(Clock(2))),
            Err(ContextError::ServiceAlreadyRegistered { provider, .. }) if provider == "timer"
        ));
        assert_eq!(
            registry.lookup(WRONG).unwrap_err(),
            ContextError::ServiceTypeMismatch("host.clock".to_string())
        );
    }

    #[test]
    fn test_remove_all_for_provider() {
        let registry = ServiceRegistry::new();
        registry.register("timer", CLOCK, Arc::new(Clock(1))).unwrap();
        assert_eq!(registry.remove_all_for("timer"), 1);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.lookup(CLOCK),
            Err(ContextError::ServiceNotFound(_))
        ));
    }
}
