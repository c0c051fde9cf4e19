// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::ConfigFile;
use crate::errors::{PipedagError, Result};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct Node {
    /// Direct dependencies: tasks whose outputs this one consumes.
    deps: Vec<String>,
    /// Direct dependents: tasks that consume this one's outputs.
    dependents: Vec<String>,
}

/// In-memory task graph keyed by task name.
///
/// Built either through the checked [`add_task`](TaskGraph::add_task) /
/// [`add_dependency`](TaskGraph::add_dependency) API (used by config
/// validation, where duplicate names and cycles must surface as errors) or
/// via [`from_config`](TaskGraph::from_config) on an already-validated
/// [`ConfigFile`].
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: HashMap<String, Node>,
    /// Task names in insertion order, for deterministic topological sorts.
    insertion: Vec<String>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a validated [`ConfigFile`].
    ///
    /// Assumes that:
    /// - all `from` references are valid
    /// - there are no cycles
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut graph = Self::new();

        for name in cfg.task.keys() {
            // Names in a BTreeMap are unique, so this cannot fail.
            let _ = graph.add_task(name);
        }

        for (name, task) in cfg.task.iter() {
            for dep in task.from.iter() {
                let _ = graph.add_dependency(name, dep);
            }
        }

        graph
    }

    /// Register a task node. Duplicate names are a configuration error.
    pub fn add_task(&mut self, name: &str) -> Result<()> {
        if self.nodes.contains_key(name) {
            return Err(PipedagError::ConfigError(format!(
                "duplicate task name '{}'",
                name
            )));
        }
        self.nodes.insert(name.to_string(), Node::default());
        self.insertion.push(name.to_string());
        Ok(())
    }

    /// Record that `task` consumes the outputs of `dep`.
    ///
    /// Fails with [`PipedagError::Cycle`] if the edge would close a cycle;
    /// in that case the graph is left unchanged.
    pub fn add_dependency(&mut self, task: &str, dep: &str) -> Result<()> {
        if !self.nodes.contains_key(task) {
            return Err(PipedagError::ConfigError(format!(
                "unknown task '{}' in dependency edge",
                task
            )));
        }
        if !self.nodes.contains_key(dep) {
            return Err(PipedagError::ConfigError(format!(
                "unknown task '{}' in dependency edge",
                dep
            )));
        }
        if task == dep {
            return Err(PipedagError::ConfigError(format!(
                "task '{}' cannot depend on itself",
                task
            )));
        }

        if self.dependencies_of(task).iter().any(|d| d == dep) {
            // Edge already present.
            return Ok(());
        }

        self.insert_edge(task, dep);

        if self.toposort_names().is_err() {
            self.remove_edge(task, dep);
            return Err(PipedagError::Cycle(format!(
                "adding dependency '{}' -> '{}' would close a cycle",
                dep, task
            )));
        }

        Ok(())
    }

    fn insert_edge(&mut self, task: &str, dep: &str) {
        if let Some(node) = self.nodes.get_mut(task) {
            node.deps.push(dep.to_string());
        }
        if let Some(node) = self.nodes.get_mut(dep) {
            node.dependents.push(task.to_string());
        }
    }

    fn remove_edge(&mut self, task: &str, dep: &str) {
        if let Some(node) = self.nodes.get_mut(task) {
            node.deps.retain(|d| d != dep);
        }
        if let Some(node) = self.nodes.get_mut(dep) {
            node.dependents.retain(|d| d != task);
        }
    }

    /// Return all task names in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.insertion.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Immediate dependencies of a task (the tasks listed in its `from`).
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list this one in their `from`).
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Topological ordering of all tasks. Every edge points from an earlier
    /// to a later position.
    ///
    /// Panics only if the graph contains a cycle, which the checked
    /// construction API makes impossible.
    pub fn topo_order(&self) -> Vec<String> {
        self.toposort_names()
            .expect("graph constructed through checked API cannot contain a cycle")
    }

    /// A task together with its transitive dependencies. Used for
    /// `--target` subgraph runs.
    pub fn ancestors_of(&self, name: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![name.to_string()];

        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for dep in self.dependencies_of(&current) {
                stack.push(dep.clone());
            }
        }

        seen
    }

    /// Edge direction in the petgraph view: dep -> task, so a topological
    /// sort yields producers before consumers.
    fn toposort_names(&self) -> std::result::Result<Vec<String>, ()> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for name in self.insertion.iter() {
            graph.add_node(name.as_str());
        }

        for name in self.insertion.iter() {
            for dep in self.dependencies_of(name) {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(|s| s.to_string()).collect()),
            Err(_) => Err(()),
        }
    }
}
