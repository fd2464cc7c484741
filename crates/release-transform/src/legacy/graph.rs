//! Dependency graph with deterministic topological ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use crate::error::TransformError;

/// A directed dependency graph.
///
/// Edges point from a dependency to its dependent; the sort emits every node
/// after all of its dependencies. Node storage is ordered, so the sort is
/// deterministic for a given edge set. A cycle fails the sort rather than
/// producing a partial order.
#[derive(Debug, Default)]
pub struct DependencyGraph<T: Ord> {
    nodes: BTreeSet<T>,
    dependents: BTreeMap<T, BTreeSet<T>>,
}

impl<T: Ord + Clone + Display> DependencyGraph<T> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        DependencyGraph {
            nodes: BTreeSet::new(),
            dependents: BTreeMap::new(),
        }
    }

    /// Adds a node with no edges.
    pub fn add_node(&mut self, node: T) {
        self.nodes.insert(node);
    }

    /// Adds an edge stating that `dependent` must come after `dependency`.
    pub fn add_edge(&mut self, dependency: T, dependent: T) {
        self.nodes.insert(dependency.clone());
        self.nodes.insert(dependent.clone());
        self.dependents
            .entry(dependency)
            .or_default()
            .insert(dependent);
    }

    /// Returns every node, dependencies before dependents.
    pub fn topological_sort(&self) -> Result<Vec<T>, TransformError> {
        let mut in_degree: BTreeMap<&T, usize> =
            self.nodes.iter().map(|node| (node, 0)).collect();
        for dependents in self.dependents.values() {
            for dependent in dependents {
                *in_degree.entry(dependent).or_insert(0) += 1;
            }
        }

        let mut ready: BTreeSet<&T> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut ordered = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.iter().next().copied() {
            ready.remove(node);
            ordered.push(node.clone());
            if let Some(dependents) = self.dependents.get(node) {
                for dependent in dependents {
                    let degree = in_degree
                        .get_mut(dependent)
                        .ok_or_else(|| TransformError::DependencyCycle {
                            node: dependent.to_string(),
                        })?;
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if ordered.len() != self.nodes.len() {
            let stuck = self
                .nodes
                .iter()
                .find(|node| !ordered.contains(node))
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(TransformError::DependencyCycle { node: stuck });
        }
        Ok(ordered)
    }
}
