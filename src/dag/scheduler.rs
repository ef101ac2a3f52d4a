// src/dag/scheduler.rs

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::dag::graph::DependencyGraph;
use crate::dag::ready_queue::ReadyQueue;
use crate::dag::record::TaskRecord;
use crate::dag::scheduler_step::{AttemptOutcome, RetryScheduled, ScheduledTask, SchedulerStep};
use crate::dag::state_manager::StateManager;
use crate::errors::{GraphError, TaskError};
use crate::task::{RetryPolicy, TaskDescriptor};
use crate::types::{CancelReason, StateTransition, TaskId, TaskState};

/// Scheduler holds the dependency graph plus every task's execution record.
///
/// It is the single place where task state changes. It is responsible for:
/// - seeding and ordering the ready set
/// - moving dispatched tasks to `Running`
/// - applying attempt outcomes (success, retry, terminal failure)
/// - cancelling dependents of failed tasks, and everything on fail-fast or
///   workflow cancellation
/// - registering new tasks while the workflow runs
///
/// It does no IO and never sleeps; timers and workers live in
/// [`crate::engine::Runtime`].
#[derive(Debug)]
pub struct Scheduler {
    graph: DependencyGraph,
    records: HashMap<TaskId, TaskRecord>,
    descriptors: HashMap<TaskId, TaskDescriptor>,
    ready: ReadyQueue,
    /// Tasks in `Ready` that wait for their retry delay to elapse.
    backoff: HashSet<TaskId>,
    default_retry: RetryPolicy,
    fail_fast: bool,
    /// Set once the workflow stops admitting new work.
    halted: Option<CancelReason>,
}

impl Scheduler {
    /// Validate the task set and build a scheduler with every task `Pending`.
    pub fn new(tasks: Vec<TaskDescriptor>, config: &OrchestratorConfig) -> Result<Self, GraphError> {
        validate_retry_policies(&tasks)?;
        let graph = DependencyGraph::build(&tasks)?;
        let mut scheduler = Self {
            graph,
            records: HashMap::with_capacity(tasks.len()),
            descriptors: HashMap::with_capacity(tasks.len()),
            ready: ReadyQueue::new(),
            backoff: HashSet::new(),
            default_retry: config.default_retry_policy.clone(),
            fail_fast: config.fail_fast,
            halted: None,
        };
        for task in tasks {
            scheduler.register(task);
        }
        debug!(tasks = scheduler.records.len(), "scheduler constructed");
        Ok(scheduler)
    }

    /// Make every task without dependencies `Ready`.
    pub fn seed(&mut self) -> SchedulerStep {
        let mut log = Vec::new();
        for id in self.graph.roots() {
            self.make_ready(&id, &mut log);
        }
        SchedulerStep {
            transitions: log,
            retry: None,
        }
    }

    /// Whether a task could be dispatched right now.
    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Pop the best ready task and move it to `Running`.
    pub fn next_ready(&mut self) -> Option<(ScheduledTask, StateTransition)> {
        while let Some(id) = self.ready.pop() {
            let mut log = Vec::new();
            let mut manager = StateManager::new(&self.graph, &mut self.records, &mut log);
            if manager.transition(&id, TaskState::Running).is_err() {
                continue;
            }

            let (Some(descriptor), Some(record), Some(transition)) =
                (self.descriptors.get(&id), self.records.get(&id), log.pop())
            else {
                warn!(task = %id, "dispatched task has no descriptor; skipping");
                continue;
            };

            info!(task = %id, attempt = record.attempt_count, "dispatching task");
            let scheduled = ScheduledTask {
                id,
                attempt: record.attempt_count,
                work: descriptor.work().clone(),
                timeout: descriptor.timeout(),
            };
            return Some((scheduled, transition));
        }
        None
    }

    /// Apply the outcome of attempt `attempt` of `task`.
    ///
    /// Outcomes for tasks that are not `Running`, or for an attempt other
    /// than the current one, are logged and ignored.
    pub fn step_completion(&mut self, task: &str, attempt: u32, outcome: AttemptOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match self.records.get(task) {
            Some(record) if record.state == TaskState::Running && record.attempt_count == attempt => {}
            Some(record) => {
                warn!(
                    task = %task,
                    attempt,
                    state = %record.state,
                    current_attempt = record.attempt_count,
                    "stale completion; ignoring"
                );
                return step;
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
                return step;
            }
        }

        match outcome {
            AttemptOutcome::Succeeded(output) => {
                self.complete_success(task, attempt, output, &mut step.transitions);
            }
            AttemptOutcome::Failed(error) => {
                step.retry = self.complete_failure(task, attempt, error, &mut step.transitions);
            }
        }

        step
    }

    /// A retry delay elapsed: put the task back into the ready queue.
    pub fn step_retry_due(&mut self, task: &str) -> SchedulerStep {
        if !self.backoff.remove(task) {
            debug!(task = %task, "retry timer fired for task no longer in backoff");
            return SchedulerStep::default();
        }

        if let Some(record) = self.records.get(task)
            && record.state == TaskState::Ready
        {
            debug!(task = %task, next_attempt = record.attempt_count + 1, "retry delay elapsed");
            self.ready
                .push(record.id.clone(), record.priority, record.registration);
        }
        SchedulerStep::default()
    }

    /// Cancel the workflow: every waiting task becomes `Cancelled`.
    ///
    /// Running tasks are left to the caller, which signals them and reports
    /// their outcomes as usual.
    pub fn step_cancel(&mut self) -> SchedulerStep {
        if self.halted == Some(CancelReason::WorkflowCancelled) {
            return SchedulerStep::default();
        }
        info!("workflow cancellation requested");
        let mut step = SchedulerStep::default();
        self.halt(CancelReason::WorkflowCancelled, &mut step.transitions);
        step
    }

    /// Register additional tasks while the workflow is running.
    ///
    /// New tasks may depend on registered tasks or on each other. A task
    /// whose dependency already ended without success is cancelled at once;
    /// one whose dependencies all succeeded is ready at once. Nothing
    /// changes if the batch is invalid.
    pub fn step_extend(&mut self, tasks: Vec<TaskDescriptor>) -> Result<SchedulerStep, GraphError> {
        validate_retry_policies(&tasks)?;
        let added = self.graph.extend(
            tasks
                .iter()
                .map(|t| (t.id().to_string(), t.dependencies().to_vec())),
        )?;
        for task in tasks {
            self.register(task);
        }

        let mut log = Vec::new();
        for id in added.iter() {
            if let Some(reason) = self.halted.clone() {
                self.cancel(id, reason, &mut log);
                continue;
            }

            let deps = self.graph.dependencies_of(id);
            let failed_dep = deps.iter().find(|d| {
                matches!(
                    self.state_of(d),
                    Some(TaskState::Failed) | Some(TaskState::Cancelled)
                )
            });

            if let Some(dep) = failed_dep.cloned() {
                self.cancel(id, CancelReason::UpstreamFailed { dependency: dep }, &mut log);
            } else if deps
                .iter()
                .all(|d| self.state_of(d) == Some(TaskState::Succeeded))
            {
                self.make_ready(id, &mut log);
            }
        }

        info!(added = added.len(), total = self.graph.len(), "workflow extended");
        Ok(SchedulerStep {
            transitions: log,
            retry: None,
        })
    }

    /// Every task is terminal.
    pub fn is_finished(&self) -> bool {
        self.records.values().all(|r| r.state.is_terminal())
    }

    pub fn running_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.state == TaskState::Running)
            .count()
    }

    /// Why the workflow stopped admitting work, if it did.
    pub fn halt_reason(&self) -> Option<&CancelReason> {
        self.halted.as_ref()
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.records.get(task).map(|r| r.state)
    }

    pub fn record(&self, task: &str) -> Option<&TaskRecord> {
        self.records.get(task)
    }

    /// Snapshots of all records in registration order.
    pub fn records(&self) -> Vec<TaskRecord> {
        self.graph
            .tasks()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    fn register(&mut self, task: TaskDescriptor) {
        let id = task.id().to_string();
        let registration = self.graph.registration_of(&id).unwrap_or(self.records.len());
        let stage = self.graph.stage_of(&id).unwrap_or(0);
        self.records.insert(
            id.clone(),
            TaskRecord::new(id.clone(), registration, stage, task.priority()),
        );
        self.descriptors.insert(id, task);
    }

    fn retry_policy_of(&self, task: &str) -> &RetryPolicy {
        self.descriptors
            .get(task)
            .and_then(|d| d.retry_policy())
            .unwrap_or(&self.default_retry)
    }

    fn complete_success(
        &mut self,
        task: &str,
        attempt: u32,
        output: serde_json::Value,
        log: &mut Vec<StateTransition>,
    ) {
        let mut manager = StateManager::new(&self.graph, &mut self.records, log);
        if manager.mark_succeeded(task, output).is_err() {
            return;
        }
        info!(task = %task, attempt, "task succeeded");

        if self.halted.is_some() {
            return;
        }

        let manager = StateManager::new(&self.graph, &mut self.records, log);
        let successors = manager.ready_successors_of(task);
        for id in successors {
            self.make_ready(&id, log);
        }
    }

    fn complete_failure(
        &mut self,
        task: &str,
        attempt: u32,
        error: TaskError,
        log: &mut Vec<StateTransition>,
    ) -> Option<RetryScheduled> {
        if error.is_cancellation() && self.halted == Some(CancelReason::WorkflowCancelled) {
            info!(task = %task, attempt, "running task stopped after cancellation");
            self.cancel(task, CancelReason::WorkflowCancelled, log);
            return None;
        }

        let policy = self.retry_policy_of(task);
        if self.halted.is_none() && error.is_retryable() && policy.allows_retry_after(attempt) {
            let delay = policy.delay_for_attempt(attempt);
            warn!(task = %task, attempt, ?delay, error = %error, "attempt failed; retrying after backoff");

            let mut manager = StateManager::new(&self.graph, &mut self.records, log);
            if manager.mark_retrying(task, error).is_err() {
                return None;
            }
            self.backoff.insert(task.to_string());
            return Some(RetryScheduled {
                task: task.to_string(),
                next_attempt: attempt + 1,
                delay,
            });
        }

        warn!(task = %task, attempt, error = %error, "task failed");
        let mut manager = StateManager::new(&self.graph, &mut self.records, log);
        if manager.mark_failed(task, error).is_err() {
            return None;
        }
        let cancelled = manager.cancel_dependents(task);
        for id in cancelled.iter() {
            self.ready.remove(id);
        }

        if self.fail_fast && self.halted.is_none() {
            info!(task = %task, "fail-fast: halting workflow");
            self.halt(CancelReason::FailFast, log);
        }
        None
    }

    fn halt(&mut self, reason: CancelReason, log: &mut Vec<StateTransition>) {
        self.halted = Some(reason.clone());
        let mut manager = StateManager::new(&self.graph, &mut self.records, log);
        let cancelled = manager.cancel_all_waiting(&reason);
        self.ready.clear();
        self.backoff.clear();
        debug!(cancelled = cancelled.len(), %reason, "cancelled waiting tasks");
    }

    fn make_ready(&mut self, id: &str, log: &mut Vec<StateTransition>) {
        let mut manager = StateManager::new(&self.graph, &mut self.records, log);
        if manager.transition(id, TaskState::Ready).is_err() {
            return;
        }
        if let Some(record) = self.records.get(id) {
            debug!(task = %id, priority = record.priority, "task ready");
            self.ready
                .push(record.id.clone(), record.priority, record.registration);
        }
    }

    fn cancel(&mut self, id: &str, reason: CancelReason, log: &mut Vec<StateTransition>) {
        let mut manager = StateManager::new(&self.graph, &mut self.records, log);
        if manager.mark_cancelled(id, reason).is_ok() {
            self.ready.remove(id);
            self.backoff.remove(id);
        }
    }
}

/// Per-task policies must hold the same invariants as the default one.
fn validate_retry_policies(tasks: &[TaskDescriptor]) -> Result<(), GraphError> {
    for task in tasks {
        if let Some(policy) = task.retry_policy() {
            policy
                .validate()
                .map_err(|reason| GraphError::InvalidRetryPolicy {
                    task: task.id().to_string(),
                    reason,
                })?;
        }
    }
    Ok(())
}
