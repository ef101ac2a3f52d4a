// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::TaskError;
use crate::task::{Work, WorkOutput};
use crate::types::{StateTransition, TaskId};

/// Structured result of a single scheduler "step".
///
/// Tests can drive the scheduler by hand and assert on what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Every state change made by this step, in order.
    pub transitions: Vec<StateTransition>,
    /// Set when the step put a task into retry backoff.
    pub retry: Option<RetryScheduled>,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.retry.is_none()
    }
}

/// A failed attempt that will be retried once `delay` has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryScheduled {
    pub task: TaskId,
    /// Number of the attempt that will run next.
    pub next_attempt: u32,
    pub delay: Duration,
}

/// Outcome of one attempt, as reported back to the scheduler.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Succeeded(WorkOutput),
    Failed(TaskError),
}

/// A task popped from the ready queue and moved to `Running`.
#[derive(Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    /// 1-based attempt number.
    pub attempt: u32,
    pub work: Arc<dyn Work>,
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("attempt", &self.attempt)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
