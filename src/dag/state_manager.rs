// src/dag/state_manager.rs

//! Task state machine.
//!
//! [`StateManager`] is a short-lived mutable view over the dependency graph
//! and the execution records. Every state change in the crate goes through
//! [`StateManager::transition`], which rejects illegal moves, stamps times
//! and appends a [`StateTransition`] to the caller's log.

use std::collections::HashMap;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::dag::graph::DependencyGraph;
use crate::dag::record::TaskRecord;
use crate::errors::{TaskError, TaskdagError};
use crate::task::WorkOutput;
use crate::types::{CancelReason, StateTransition, TaskId, TaskState};

/// Whether `from -> to` is an edge of the task lifecycle.
pub fn is_valid_transition(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;
    matches!(
        (from, to),
        (Pending, Ready)
            | (Ready, Running)
            | (Running, Succeeded)
            | (Running, Ready)
            | (Running, Failed)
            | (Running, Cancelled)
            | (Pending, Cancelled)
            | (Ready, Cancelled)
    )
}

/// Mutable view used by the scheduler to move tasks through their lifecycle.
pub struct StateManager<'a> {
    graph: &'a DependencyGraph,
    records: &'a mut HashMap<TaskId, TaskRecord>,
    log: &'a mut Vec<StateTransition>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        records: &'a mut HashMap<TaskId, TaskRecord>,
        log: &'a mut Vec<StateTransition>,
    ) -> Self {
        Self {
            graph,
            records,
            log,
        }
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.records.get(id).map(|r| r.state)
    }

    /// Move `id` to `to`.
    ///
    /// Entering `Running` counts a new attempt and stamps its start time;
    /// entering a terminal state stamps the end time. Returns the previous
    /// state.
    pub fn transition(&mut self, id: &str, to: TaskState) -> Result<TaskState, TaskdagError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| TaskdagError::TaskNotFound(id.to_string()))?;

        let from = record.state;
        if !is_valid_transition(from, to) {
            warn!(task = %id, %from, %to, "rejecting illegal state transition");
            return Err(TaskdagError::InvalidTransition {
                task: id.to_string(),
                from,
                to,
            });
        }

        let now = Instant::now();
        if to == TaskState::Running {
            record.attempt_count += 1;
            record.started_at = Some(now);
            record.first_started_at.get_or_insert(now);
        }
        if to.is_terminal() {
            record.ended_at = Some(now);
        }
        record.state = to;

        debug!(task = %id, %from, %to, attempt = record.attempt_count, "state transition");
        self.log.push(StateTransition {
            task: record.id.clone(),
            from,
            to,
            attempt: record.attempt_count,
            at: now,
        });
        Ok(from)
    }

    pub fn mark_succeeded(&mut self, id: &str, output: WorkOutput) -> Result<(), TaskdagError> {
        self.transition(id, TaskState::Succeeded)?;
        if let Some(record) = self.records.get_mut(id) {
            record.output = Some(output);
            record.last_error = None;
        }
        Ok(())
    }

    /// `Running -> Ready` after a retryable failure.
    pub fn mark_retrying(&mut self, id: &str, error: TaskError) -> Result<(), TaskdagError> {
        self.transition(id, TaskState::Ready)?;
        if let Some(record) = self.records.get_mut(id) {
            record.last_error = Some(error);
        }
        Ok(())
    }

    pub fn mark_failed(&mut self, id: &str, error: TaskError) -> Result<(), TaskdagError> {
        self.transition(id, TaskState::Failed)?;
        if let Some(record) = self.records.get_mut(id) {
            record.last_error = Some(error);
        }
        Ok(())
    }

    pub fn mark_cancelled(&mut self, id: &str, reason: CancelReason) -> Result<(), TaskdagError> {
        self.transition(id, TaskState::Cancelled)?;
        if let Some(record) = self.records.get_mut(id) {
            record.cancel_reason = Some(reason);
        }
        Ok(())
    }

    /// `Pending` dependents of `completed` whose dependencies have all
    /// succeeded, in registration order.
    pub fn ready_successors_of(&self, completed: &str) -> Vec<TaskId> {
        let records = &*self.records;
        self.graph
            .ready_successors(completed, |dep| {
                records
                    .get(dep)
                    .is_some_and(|r| r.state == TaskState::Succeeded)
            })
            .into_iter()
            .filter(|id| records.get(id).is_some_and(|r| r.state == TaskState::Pending))
            .collect()
    }

    /// Cancel every waiting transitive dependent of a task that ended
    /// without succeeding.
    ///
    /// Returns the newly cancelled ids in registration order.
    pub fn cancel_dependents(&mut self, failed: &str) -> Vec<TaskId> {
        let mut cancelled = Vec::new();

        for id in self.graph.transitive_dependents(failed) {
            if !self.is_waiting(&id) {
                continue;
            }
            let reason = CancelReason::UpstreamFailed {
                dependency: failed.to_string(),
            };
            if self.mark_cancelled(&id, reason).is_ok() {
                cancelled.push(id);
            }
        }

        if !cancelled.is_empty() {
            debug!(task = %failed, cancelled = cancelled.len(), "cancelled downstream tasks");
        }
        cancelled
    }

    /// Cancel every `Pending` or `Ready` task.
    ///
    /// Returns the newly cancelled ids in registration order.
    pub fn cancel_all_waiting(&mut self, reason: &CancelReason) -> Vec<TaskId> {
        let waiting: Vec<TaskId> = self
            .graph
            .tasks()
            .filter(|id| self.is_waiting(id))
            .map(str::to_string)
            .collect();

        waiting
            .into_iter()
            .filter(|id| self.mark_cancelled(id, reason.clone()).is_ok())
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.records.values().all(|r| r.state.is_terminal())
    }

    pub fn running_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.state == TaskState::Running)
            .count()
    }

    fn is_waiting(&self, id: &str) -> bool {
        matches!(
            self.state_of(id),
            Some(TaskState::Pending) | Some(TaskState::Ready)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::WorkError;

    fn setup() -> (DependencyGraph, HashMap<TaskId, TaskRecord>) {
        let graph = DependencyGraph::from_edges(vec![
            ("a".to_string(), vec![]),
            ("b".to_string(), vec!["a".to_string()]),
            ("c".to_string(), vec!["b".to_string()]),
            ("x".to_string(), vec![]),
        ])
        .unwrap();
        let records = graph
            .tasks()
            .map(|id| {
                let record = TaskRecord::new(
                    id.to_string(),
                    graph.registration_of(id).unwrap(),
                    graph.stage_of(id).unwrap(),
                    0,
                );
                (id.to_string(), record)
            })
            .collect();
        (graph, records)
    }

    #[test]
    fn lifecycle_edges() {
        use TaskState::*;
        assert!(is_valid_transition(Pending, Ready));
        assert!(is_valid_transition(Running, Ready));
        assert!(!is_valid_transition(Pending, Running));
        assert!(!is_valid_transition(Succeeded, Ready));
        assert!(!is_valid_transition(Cancelled, Cancelled));
        assert!(!is_valid_transition(Failed, Running));
    }

    #[test]
    fn illegal_transition_is_rejected_without_side_effects() {
        let (graph, mut records) = setup();
        let mut log = Vec::new();
        let mut mgr = StateManager::new(&graph, &mut records, &mut log);

        let err = mgr.transition("a", TaskState::Running).unwrap_err();
        assert!(matches!(err, TaskdagError::InvalidTransition { .. }));
        assert_eq!(mgr.state_of("a"), Some(TaskState::Pending));
        assert!(log.is_empty());
    }

    #[test]
    fn running_counts_attempts_and_terminal_stamps_end() {
        let (graph, mut records) = setup();
        let mut log = Vec::new();
        let mut mgr = StateManager::new(&graph, &mut records, &mut log);

        mgr.transition("a", TaskState::Ready).unwrap();
        mgr.transition("a", TaskState::Running).unwrap();
        mgr.mark_retrying("a", WorkError::retryable("flaky").into()).unwrap();
        mgr.transition("a", TaskState::Running).unwrap();
        mgr.mark_succeeded("a", serde_json::json!(1)).unwrap();

        let a = &records["a"];
        assert_eq!(a.attempt_count(), 2);
        assert!(a.ended_at().is_some());
        assert!(a.last_error().is_none());
        assert_eq!(log.len(), 5);
        assert_eq!(log[4].attempt, 2);
    }

    #[test]
    fn failure_cancels_only_downstream_tasks() {
        let (graph, mut records) = setup();
        let mut log = Vec::new();
        let mut mgr = StateManager::new(&graph, &mut records, &mut log);

        mgr.transition("a", TaskState::Ready).unwrap();
        mgr.transition("x", TaskState::Ready).unwrap();
        mgr.transition("a", TaskState::Running).unwrap();
        mgr.mark_failed("a", WorkError::permanent("boom").into()).unwrap();

        let cancelled = mgr.cancel_dependents("a");
        assert_eq!(cancelled, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(mgr.state_of("x"), Some(TaskState::Ready));
        assert!(!mgr.all_terminal());

        assert_eq!(
            records["c"].cancel_reason(),
            Some(&CancelReason::UpstreamFailed {
                dependency: "a".to_string()
            })
        );
    }
}
