//! Capability entitlements for mods.
//!
//! A mod lists the capabilities it needs in its manifest. During initialization
//! the host hands the mod a context that only exposes those capabilities; any
//! other request is refused.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A capability that a mod can request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Subscribe to host events.
    Events,

    /// Publish typed services for mods loaded later.
    ProvideServices,

    /// Look up services published by mods loaded earlier.
    LookupServices,

    /// Register patches on host methods.
    Patching,

    /// Evaluate scripts through the host's script sandbox.
    Scripting,

    /// Custom capability for host-specific extensions.
    Custom(String),
}

impl Capability {
    /// Parse a capability from a string.
    pub fn parse(s: &str) -> Self {
        match s {
            "events" => Capability::Events,
            "provide_services" => Capability::ProvideServices,
            "lookup_services" => Capability::LookupServices,
            "patching" => Capability::Patching,
            "scripting" => Capability::Scripting,
            other => Capability::Custom(other.to_string()),
        }
    }

    /// Convert capability to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Capability::Events => "events",
            Capability::ProvideServices => "provide_services",
            Capability::LookupServices => "lookup_services",
            Capability::Patching => "patching",
            Capability::Scripting => "scripting",
            Capability::Custom(s) => s,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    capabilities: HashSet<Capability>,
}

impl CapabilitySet {
    /// Create an empty capability set.
    pub fn new() -> Self {
        Self {
            capabilities: HashSet::new(),
        }
    }

    /// Create a capability set from a list of capability strings.
    pub fn from_strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let capabilities = strings
            .into_iter()
            .map(|s| Capability::parse(s.as_ref()))
            .collect();
        Self { capabilities }
    }

    /// Add a capability to the set.
    pub fn add(&mut self, cap: Capability) {
        self.capabilities.insert(cap);
    }

    /// Check if the set contains a capability.
    pub fn has(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Get all capabilities in the set.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    /// Capability names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.iter().map(|c| c.as_str().to_string()).collect();
        names.sort();
        names
    }

    /// Get the number of capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}
