// src/dag/graph.rs

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::dag::validate::validate_batch;
use crate::errors::GraphError;
use crate::task::TaskDescriptor;
use crate::types::TaskId;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct dependencies: tasks that must succeed before this one can run.
    deps: Vec<TaskId>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskId>,
    /// Position in registration order (0-based, never reused).
    registration: usize,
    /// Topological depth: 0 without dependencies, else 1 + max stage of deps.
    stage: usize,
}

/// Validated, acyclic dependency graph keyed by task id.
///
/// Edges point from a dependency to its dependents. The graph carries no
/// task state; readiness queries take a predicate that tells it which tasks
/// have succeeded.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<TaskId, DagNode>,
    /// Task ids in registration order.
    order: Vec<TaskId>,
}

impl DependencyGraph {
    /// Build and validate a graph from task descriptors.
    ///
    /// Fails on empty or duplicate ids, unknown dependencies, self
    /// dependencies and cycles.
    pub fn build(tasks: &[TaskDescriptor]) -> Result<Self, GraphError> {
        Self::from_edges(
            tasks
                .iter()
                .map(|t| (t.id().to_string(), t.dependencies().to_vec())),
        )
    }

    /// Build from raw `(id, dependencies)` pairs (registration order = order
    /// of the iterator).
    pub fn from_edges<I>(edges: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (TaskId, Vec<TaskId>)>,
    {
        let mut graph = Self::default();
        graph.extend(edges)?;
        Ok(graph)
    }

    /// Add a batch of new nodes.
    ///
    /// New nodes may depend on registered nodes or on each other. Registered
    /// nodes are never given new dependencies, so only the batch is checked
    /// for cycles. On error the graph is left unchanged.
    ///
    /// Returns the new ids in dependency order.
    pub fn extend<I>(&mut self, edges: I) -> Result<Vec<TaskId>, GraphError>
    where
        I: IntoIterator<Item = (TaskId, Vec<TaskId>)>,
    {
        let batch: Vec<(TaskId, Vec<TaskId>)> = edges.into_iter().collect();
        let order = validate_batch(|id| self.nodes.contains_key(id), &batch)?;

        let base = self.order.len();
        let mut inserted = Vec::with_capacity(batch.len());

        for i in order {
            let (id, listed) = &batch[i];
            let mut deps: Vec<TaskId> = Vec::with_capacity(listed.len());
            for dep in listed.iter() {
                if !deps.contains(dep) {
                    deps.push(dep.clone());
                }
            }

            let stage = deps
                .iter()
                .filter_map(|d| self.nodes.get(d))
                .map(|n| n.stage + 1)
                .max()
                .unwrap_or(0);

            for dep in deps.iter() {
                if let Some(dep_node) = self.nodes.get_mut(dep) {
                    dep_node.dependents.push(id.clone());
                }
            }

            self.nodes.insert(
                id.clone(),
                DagNode {
                    deps,
                    dependents: Vec::new(),
                    registration: base + i,
                    stage,
                },
            );
            inserted.push(id.clone());
        }

        self.order
            .extend(batch.into_iter().map(|(id, _)| id));

        debug!(added = inserted.len(), total = self.order.len(), "dependency graph extended");
        Ok(inserted)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All task ids in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Tasks without dependencies, in registration order.
    pub fn roots(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| self.dependencies_of(id).is_empty())
            .cloned()
            .collect()
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn registration_of(&self, id: &str) -> Option<usize> {
        self.nodes.get(id).map(|n| n.registration)
    }

    pub fn stage_of(&self, id: &str) -> Option<usize> {
        self.nodes.get(id).map(|n| n.stage)
    }

    /// Deterministic topological order: by stage, then registration.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tasks().collect();
        ids.sort_by_key(|id| {
            self.nodes
                .get(*id)
                .map(|n| (n.stage, n.registration))
                .unwrap_or((usize::MAX, usize::MAX))
        });
        ids
    }

    /// Dependents of `completed` whose *entire* dependency set now satisfies
    /// `is_succeeded`, in registration order.
    pub fn ready_successors<F>(&self, completed: &str, is_succeeded: F) -> Vec<TaskId>
    where
        F: Fn(&str) -> bool,
    {
        let mut ready: Vec<TaskId> = self
            .dependents_of(completed)
            .iter()
            .filter(|dependent| {
                self.dependencies_of(dependent)
                    .iter()
                    .all(|dep| is_succeeded(dep))
            })
            .cloned()
            .collect();
        self.sort_by_registration(&mut ready);
        ready
    }

    /// Every task reachable from `id` through dependent edges, in
    /// registration order. Does not include `id` itself.
    pub fn transitive_dependents(&self, id: &str) -> Vec<TaskId> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = self.dependents_of(id).iter().map(|s| s.as_str()).collect();

        while let Some(name) = queue.pop_front() {
            if !visited.insert(name) {
                continue;
            }
            queue.extend(self.dependents_of(name).iter().map(|s| s.as_str()));
        }

        let mut out: Vec<TaskId> = visited.into_iter().map(str::to_string).collect();
        self.sort_by_registration(&mut out);
        out
    }

    fn sort_by_registration(&self, ids: &mut [TaskId]) {
        ids.sort_by_key(|id| self.registration_of(id).unwrap_or(usize::MAX));
    }
}
