// src/dag/record.rs

//! Per-task execution record.

use std::time::Duration;

use tokio::time::Instant;

use crate::errors::TaskError;
use crate::task::WorkOutput;
use crate::types::{CancelReason, Priority, TaskId, TaskState};

/// Mutable execution record of one task.
///
/// Only the state machine writes to it; everybody else receives clones
/// (snapshots) through the accessors below.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub(crate) id: TaskId,
    pub(crate) registration: usize,
    pub(crate) stage: usize,
    pub(crate) priority: Priority,
    pub(crate) state: TaskState,
    pub(crate) attempt_count: u32,
    pub(crate) last_error: Option<TaskError>,
    pub(crate) cancel_reason: Option<CancelReason>,
    pub(crate) output: Option<WorkOutput>,
    /// Start of the first attempt.
    pub(crate) first_started_at: Option<Instant>,
    /// Start of the most recent attempt.
    pub(crate) started_at: Option<Instant>,
    pub(crate) ended_at: Option<Instant>,
}

impl TaskRecord {
    pub(crate) fn new(id: TaskId, registration: usize, stage: usize, priority: Priority) -> Self {
        Self {
            id,
            registration,
            stage,
            priority,
            state: TaskState::Pending,
            attempt_count: 0,
            last_error: None,
            cancel_reason: None,
            output: None,
            first_started_at: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registration(&self) -> usize {
        self.registration
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn last_error(&self) -> Option<&TaskError> {
        self.last_error.as_ref()
    }

    pub fn cancel_reason(&self) -> Option<&CancelReason> {
        self.cancel_reason.as_ref()
    }

    pub fn output(&self) -> Option<&WorkOutput> {
        self.output.as_ref()
    }

    pub fn first_started_at(&self) -> Option<Instant> {
        self.first_started_at
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    /// Time from the start of the first attempt to the terminal state.
    ///
    /// `None` for tasks that never ran or have not finished.
    pub fn duration(&self) -> Option<Duration> {
        match (self.first_started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }
}
