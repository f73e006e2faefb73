//! Dependency graph over a set of candidate mods.
//!
//! An edge `a -> b` means `a` must load before `b`. Hard edges come from
//! dependencies; soft edges come from `load_after`/`load_before` hints and
//! only exist when both endpoints are present.

use modforge_manifest::ModManifest;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Origin of an ordering edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// From a dependency declaration.
    Hard,
    /// From an ordering hint.
    Soft,
}

/// Directed ordering graph keyed by mod id.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    successors: BTreeMap<String, BTreeSet<String>>,
    predecessors: BTreeMap<String, BTreeSet<String>>,
    kinds: HashMap<(String, String), EdgeKind>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a candidate set.
    ///
    /// Dependencies on absent mods add no edge. A soft hint that points the
    /// opposite way of a hard edge is dropped; the resolver reports it separately.
    pub fn from_manifests<'a, I>(manifests: I) -> Self
    where
        I: IntoIterator<Item = &'a ModManifest>,
    {
        let manifests: Vec<&ModManifest> = manifests.into_iter().collect();
        let mut graph = Self::new();

        for manifest in &manifests {
            graph.add_node(manifest.id());
        }

        for manifest in &manifests {
            for dep in manifest.dependencies() {
                if graph.contains(&dep.mod_id) {
                    graph.add_edge(&dep.mod_id, manifest.id(), EdgeKind::Hard);
                }
            }
        }

        for manifest in &manifests {
            for after in manifest.load_after() {
                graph.add_soft_edge(after, manifest.id());
            }
            for before in manifest.load_before() {
                graph.add_soft_edge(manifest.id(), before);
            }
        }

        graph
    }

    pub fn add_node(&mut self, id: &str) {
        self.nodes.insert(id.to_string());
    }

    /// Add `before -> after`. A hard edge is never downgraded to soft.
    pub fn add_edge(&mut self, before: &str, after: &str, kind: EdgeKind) {
        self.add_node(before);
        self.add_node(after);
        self.successors
            .entry(before.to_string())
            .or_default()
            .insert(after.to_string());
        self.predecessors
            .entry(after.to_string())
            .or_default()
            .insert(before.to_string());

        let key = (before.to_string(), after.to_string());
        if kind == EdgeKind::Hard || !self.kinds.contains_key(&key) {
            self.kinds.insert(key, kind);
        }
    }

    fn add_soft_edge(&mut self, before: &str, after: &str) {
        if !self.contains(before) || !self.contains(after) {
            return;
        }
        if self.edge_kind(after, before) == Some(EdgeKind::Hard) {
            return;
        }
        self.add_edge(before, after, EdgeKind::Soft);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in ascending order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn edge_kind(&self, before: &str, after: &str) -> Option<EdgeKind> {
        self.kinds
            .get(&(before.to_string(), after.to_string()))
            .copied()
    }

    pub fn has_edge(&self, before: &str, after: &str) -> bool {
        self.edge_kind(before, after).is_some()
    }

    /// Mods `id` directly depends on (hard edges only).
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.predecessors
            .get(id)
            .into_iter()
            .flatten()
            .filter(|dep| self.edge_kind(dep, id) == Some(EdgeKind::Hard))
            .cloned()
            .collect()
    }

    /// Mods that directly depend on `id` (hard edges only).
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.successors
            .get(id)
            .into_iter()
            .flatten()
            .filter(|dependent| self.edge_kind(id, dependent) == Some(EdgeKind::Hard))
            .cloned()
            .collect()
    }

    /// Everything `id` needs, directly or indirectly, through hard edges.
    pub fn transitive_dependencies(&self, id: &str) -> BTreeSet<String> {
        self.closure(id, |current| self.dependencies_of(current))
    }

    /// Everything that needs `id`, directly or indirectly, through hard edges.
    pub fn transitive_dependents(&self, id: &str) -> BTreeSet<String> {
        self.closure(id, |current| self.dependents_of(current))
    }

    fn closure<F>(&self, start: &str, next: F) -> BTreeSet<String>
    where
        F: Fn(&str) -> Vec<String>,
    {
        let mut seen = BTreeSet::new();
        let mut stack = next(start);
        while let Some(id) = stack.pop() {
            if id != start && seen.insert(id.clone()) {
                stack.extend(next(&id));
            }
        }
        seen
    }

    /// Whether `a` and `b` may load in either relative order.
    ///
    /// Considers every edge, hard or soft.
    pub fn are_independent(&self, a: &str, b: &str) -> bool {
        a != b && !self.reaches(a, b) && !self.reaches(b, a)
    }

    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from.to_string()];
        while let Some(id) = stack.pop() {
            if let Some(next) = self.successors.get(&id) {
                for succ in next {
                    if succ == to {
                        return true;
                    }
                    if seen.insert(succ.clone()) {
                        stack.push(succ.clone());
                    }
                }
            }
        }
        false
    }

    /// Copy of the graph without the given nodes and their edges.
    pub fn without(&self, removed: &BTreeSet<String>) -> Self {
        let mut graph = Self::new();
        for node in self.nodes.iter().filter(|n| !removed.contains(*n)) {
            graph.add_node(node);
        }
        for ((before, after), kind) in &self.kinds {
            if !removed.contains(before) && !removed.contains(after) {
                graph.add_edge(before, after, *kind);
            }
        }
        graph
    }

    /// Kahn's algorithm with the ready set ordered by ascending id.
    ///
    /// On failure returns a cycle as a path of "depends on" steps whose
    /// first and last element are the same id.
    pub fn topological_order(&self) -> Result<Vec<String>, Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.predecessors.get(n).map_or(0, BTreeSet::len)))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            for succ in self.successors.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(succ.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(succ.as_str());
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            return Ok(order);
        }

        let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let stuck: BTreeSet<&str> = self
            .nodes
            .iter()
            .map(String::as_str)
            .filter(|n| !placed.contains(n))
            .collect();
        Err(self.find_cycle(&stuck))
    }

    /// Walk predecessors inside the stuck set until a node repeats.
    ///
    /// Every stuck node keeps at least one stuck predecessor, so the walk
    /// cannot dead-end.
    fn find_cycle(&self, stuck: &BTreeSet<&str>) -> Vec<String> {
        let Some(mut current) = stuck.first().copied() else {
            return Vec::new();
        };

        let mut path: Vec<&str> = Vec::new();
        let mut position: HashMap<&str, usize> = HashMap::new();

        loop {
            if let Some(&start) = position.get(current) {
                let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(current.to_string());
                return cycle;
            }
            position.insert(current, path.len());
            path.push(current);

            let next = self
                .predecessors
                .get(current)
                .into_iter()
                .flatten()
                .map(String::as_str)
                .find(|p| stuck.contains(p));

            match next {
                Some(p) => current = p,
                None => return path.iter().map(|s| s.to_string()).collect(),
            }
        }
    }
}
