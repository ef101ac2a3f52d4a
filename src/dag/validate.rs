// src/dag/validate.rs

//! Structural checks run before nodes enter the [`DependencyGraph`].
//!
//! All checks operate on a *batch* of `(id, dependencies)` pairs against the
//! nodes that are already registered. Existing nodes never gain new edges,
//! so any cycle must lie entirely inside the batch and the cycle check only
//! has to walk the batch.
//!
//! [`DependencyGraph`]: crate::dag::DependencyGraph

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::GraphError;
use crate::types::TaskId;

pub(crate) type Batch = [(TaskId, Vec<TaskId>)];

/// Validate a batch and return the indices of its entries in dependency
/// order (every entry comes after the batch entries it depends on).
pub(crate) fn validate_batch<F>(is_registered: F, batch: &Batch) -> Result<Vec<usize>, GraphError>
where
    F: Fn(&str) -> bool,
{
    let index = check_ids(&is_registered, batch)?;
    check_dependencies(&is_registered, &index, batch)?;
    batch_order(&index, batch)
}

/// Ids must be non-empty and unique, both within the batch and against the
/// registered nodes. Returns an id -> batch index map.
fn check_ids<'a, F>(is_registered: &F, batch: &'a Batch) -> Result<HashMap<&'a str, usize>, GraphError>
where
    F: Fn(&str) -> bool,
{
    let mut index = HashMap::with_capacity(batch.len());

    for (i, (id, _)) in batch.iter().enumerate() {
        if id.trim().is_empty() {
            return Err(GraphError::EmptyId);
        }
        if is_registered(id) || index.insert(id.as_str(), i).is_some() {
            return Err(GraphError::DuplicateId(id.clone()));
        }
    }

    Ok(index)
}

fn check_dependencies<F>(
    is_registered: &F,
    index: &HashMap<&str, usize>,
    batch: &Batch,
) -> Result<(), GraphError>
where
    F: Fn(&str) -> bool,
{
    for (id, deps) in batch.iter() {
        for dep in deps.iter() {
            if dep == id {
                return Err(GraphError::SelfDependency(id.clone()));
            }
            if !is_registered(dep) && !index.contains_key(dep.as_str()) {
                return Err(GraphError::UnknownDependency {
                    task: id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Depth-first topological sort over the batch-internal edges.
///
/// Edge direction: dependency -> dependent.
fn batch_order(index: &HashMap<&str, usize>, batch: &Batch) -> Result<Vec<usize>, GraphError> {
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();

    for i in 0..batch.len() {
        graph.add_node(i);
    }

    for (i, (_, deps)) in batch.iter().enumerate() {
        for dep in deps.iter() {
            if let Some(&j) = index.get(dep.as_str()) {
                graph.add_edge(j, i, ());
            }
        }
    }

    toposort(&graph, None).map_err(|cycle| GraphError::Cycle {
        task: batch[cycle.node_id()].0.clone(),
    })
}
