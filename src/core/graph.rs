//! Step dependency graph.
//!
//! `StepGraph` stores the dependency relation of a workflow as a directed
//! acyclic graph. Edges point from a dependency to the step that waits on
//! it. Node indices follow declaration order, which the scheduler uses as
//! its tie-break when several steps are runnable at once.

use crate::core::step::{Step, StepId, StepStatus};
use crate::error::{Error, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::collections::HashMap;

/// The step dependency graph.
pub struct StepGraph {
    graph: DiGraph<StepId, ()>,
    index: HashMap<StepId, NodeIndex>,
}

impl StepGraph {
    /// Build and validate the graph for a list of steps.
    ///
    /// # Errors
    /// - `DuplicateStep` if two steps share an id
    /// - `UnknownDependency` if a step depends on an id that is not declared
    /// - `DependencyCycle` if the dependencies form a cycle
    pub fn from_steps(steps: &[Step]) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(steps.len(), steps.len());
        let mut index = HashMap::with_capacity(steps.len());

        for step in steps {
            if index.contains_key(&step.id) {
                return Err(Error::DuplicateStep(step.id.clone()));
            }
            let node = graph.add_node(step.id.clone());
            index.insert(step.id.clone(), node);
        }

        // Dependencies may reference steps declared later, so edges are
        // added only once every node exists.
        for step in steps {
            let to = index[&step.id];
            for dependency in &step.depends_on {
                let from = index
                    .get(dependency)
                    .ok_or_else(|| Error::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dependency.clone(),
                    })?;
                graph.add_edge(*from, to, ());
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            let id = graph
                .node_weight(cycle.node_id())
                .cloned()
                .unwrap_or_else(|| StepId::from("unknown"));
            Error::DependencyCycle(id)
        })?;

        Ok(Self { graph, index })
    }

    /// Number of steps in the graph.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.index.contains_key(id)
    }

    /// Declaration position of a step.
    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.index.get(id).map(|node| node.index())
    }

    /// Step ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = &StepId> {
        self.graph.node_weights()
    }

    /// Direct dependencies of a step, in declaration order.
    pub fn dependencies(&self, id: &StepId) -> Vec<&StepId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut nodes: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .collect();
        nodes.sort();
        nodes.dedup();
        nodes.into_iter().map(|n| &self.graph[n]).collect()
    }

    /// Every step that depends on `id`, directly or transitively, in
    /// declaration order.
    pub fn transitive_dependents(&self, id: &StepId) -> Vec<&StepId> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };
        let mut nodes = Vec::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                nodes.push(node);
            }
        }
        nodes.sort();
        nodes.into_iter().map(|n| &self.graph[n]).collect()
    }

    /// First dependency of `id` that has not succeeded, if any.
    pub fn unmet_dependency<F>(&self, id: &StepId, status_of: F) -> Option<&StepId>
    where
        F: Fn(&StepId) -> StepStatus,
    {
        self.dependencies(id)
            .into_iter()
            .find(|dep| status_of(dep) != StepStatus::Success)
    }

    /// Idle steps whose dependencies have all succeeded, in declaration order.
    pub fn ready_steps<F>(&self, status_of: F) -> Vec<&StepId>
    where
        F: Fn(&StepId) -> StepStatus,
    {
        self.graph
            .node_indices()
            .filter_map(|node| {
                let id = self.graph.node_weight(node)?;
                if status_of(id) != StepStatus::Idle {
                    return None;
                }
                let deps_satisfied = self
                    .graph
                    .neighbors_directed(node, Direction::Incoming)
                    .all(|dep| status_of(&self.graph[dep]) == StepStatus::Success);
                deps_satisfied.then_some(id)
            })
            .collect()
    }
}

impl std::fmt::Debug for StepGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepGraph")
            .field("steps", &self.graph.node_count())
            .field("dependencies", &self.graph.edge_count())
            .finish()
    }
}
