//! Dependency graph over registered components.
//!
//! Design:
//! - Forward edges: component -> components it depends on
//! - Reverse edges: component -> components that depend on it
//! - Invariant: edges and reverse_edges are kept in sync
//!
//! Reverse edges are recorded even when the dependency is not registered yet, so the
//! registration order of two related components never changes the graph.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::ComponentId;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Forward edges, in declaration order with duplicates removed.
    edges: HashMap<ComponentId, Vec<ComponentId>>,

    /// Reverse edges: "who is waiting for this component?"
    reverse_edges: HashMap<ComponentId, HashSet<ComponentId>>,

    /// Registered nodes in registration order. Drives every deterministic ordering.
    order: Vec<ComponentId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with its declared dependencies. Returns false if `id` is already present.
    pub fn add_node(&mut self, id: ComponentId, dependencies: &[ComponentId]) -> bool {
        if self.edges.contains_key(&id) {
            return false;
        }

        let mut deps: Vec<ComponentId> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        for dep in &deps {
            self.reverse_edges
                .entry(dep.clone())
                .or_default()
                .insert(id.clone());
        }

        self.edges.insert(id.clone(), deps);
        self.order.push(id);
        true
    }

    /// Remove a node and its forward edges. Edges other nodes declare towards it stay,
    /// so they show up in `missing_dependencies` afterwards.
    pub fn remove_node(&mut self, id: &ComponentId) -> bool {
        let Some(deps) = self.edges.remove(id) else {
            return false;
        };
        for dep in deps {
            if let Entry::Occupied(mut e) = self.reverse_edges.entry(dep) {
                e.get_mut().remove(id);
                if e.get().is_empty() {
                    e.remove_entry();
                }
            }
        }
        self.order.retain(|registered| registered != id);
        true
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.edges.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> &[ComponentId] {
        &self.order
    }

    pub fn dependencies_of(&self, id: &ComponentId) -> &[ComponentId] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Registered components that declare `id` as a dependency, in registration order.
    pub fn dependents_of(&self, id: &ComponentId) -> Vec<ComponentId> {
        match self.reverse_edges.get(id) {
            Some(waiting) => self
                .order
                .iter()
                .filter(|candidate| waiting.contains(*candidate))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// `(component, dependency)` pairs whose dependency is not registered.
    pub fn missing_dependencies(&self) -> Vec<(ComponentId, ComponentId)> {
        let mut missing = Vec::new();
        for id in &self.order {
            for dep in self.dependencies_of(id) {
                if !self.edges.contains_key(dep) {
                    missing.push((id.clone(), dep.clone()));
                }
            }
        }
        missing
    }

    /// Topological order (dependencies first) by Kahn's algorithm.
    ///
    /// In-degree is the number of declared dependencies. Ties are broken by
    /// registration order, so the result is deterministic. If the order does not
    /// cover every node, the uncovered ids are returned as the error, in
    /// registration order: they sit on a cycle or depend on one.
    ///
    /// Unregistered dependencies never reach in-degree zero either; check
    /// `missing_dependencies` first to tell the two cases apart.
    pub fn topological_order(&self) -> Result<Vec<ComponentId>, Vec<ComponentId>> {
        let position: HashMap<&ComponentId, usize> =
            self.order.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let mut in_degree: HashMap<&ComponentId, usize> = self
            .order
            .iter()
            .map(|id| (id, self.dependencies_of(id).len()))
            .collect();

        let mut queue: VecDeque<&ComponentId> = self
            .order
            .iter()
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();

        let mut result = Vec::with_capacity(self.order.len());
        while let Some(current) = queue.pop_front() {
            result.push(current.clone());

            let mut dependents: Vec<&ComponentId> = self
                .reverse_edges
                .get(current)
                .map(|waiting| waiting.iter().filter(|d| position.contains_key(d)).collect())
                .unwrap_or_default();
            dependents.sort_by_key(|d| position.get(d).copied().unwrap_or(usize::MAX));

            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if result.len() == self.order.len() {
            return Ok(result);
        }

        let covered: HashSet<&ComponentId> = result.iter().collect();
        Err(self
            .order
            .iter()
            .filter(|id| !covered.contains(id))
            .cloned()
            .collect())
    }
}
