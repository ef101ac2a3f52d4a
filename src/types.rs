use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tokio::time::Instant;

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// Dispatch tie-break among ready tasks; higher runs first.
pub type Priority = i32;

/// Lifecycle state of a single task.
///
/// ```text
/// Pending -> Ready -> Running -> Succeeded
///                  ^     |   -> Failed
///                  +-----+   (retry after backoff)
/// Pending | Ready -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Waiting on at least one dependency.
    Pending,
    /// All dependencies succeeded; waiting for a slot (or for a retry
    /// backoff to elapse).
    Ready,
    /// An attempt is in flight.
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    /// `Succeeded`, `Failed` and `Cancelled` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Ready => "ready",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskState::Pending),
            "ready" => Ok(TaskState::Ready),
            "running" => Ok(TaskState::Running),
            "succeeded" => Ok(TaskState::Succeeded),
            "failed" => Ok(TaskState::Failed),
            "cancelled" => Ok(TaskState::Cancelled),
            other => Err(format!("invalid task state: {other}")),
        }
    }
}

/// Why a task ended up `Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CancelReason {
    /// A (transitive) dependency terminated without succeeding.
    UpstreamFailed { dependency: TaskId },
    /// The caller cancelled the whole workflow.
    WorkflowCancelled,
    /// Another task failed terminally and `fail_fast` is enabled.
    FailFast,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::UpstreamFailed { dependency } => {
                write!(f, "upstream task '{dependency}' did not succeed")
            }
            CancelReason::WorkflowCancelled => f.write_str("workflow cancelled"),
            CancelReason::FailFast => f.write_str("fail-fast halt"),
        }
    }
}

/// A single state change, as delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub task: TaskId,
    pub from: TaskState,
    pub to: TaskState,
    /// Attempt number at the time of the transition (0 before the first
    /// dispatch).
    pub attempt: u32,
    pub at: Instant,
}
