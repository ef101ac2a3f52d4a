// src/errors.rs

//! Crate-wide error types.
//!
//! - [`GraphError`] is raised while building or extending the dependency
//!   graph. It is the only error that aborts a workflow, and only before
//!   any task has run.
//! - [`TaskError`] is what a single attempt can end with. It is stored on the
//!   task's execution record and never unwinds into the scheduling loop.
//! - [`TaskdagError`] wraps everything else (config, IO, runtime plumbing).

use std::time::Duration;

use thiserror::Error;

use crate::task::WorkError;
use crate::types::{TaskId, TaskState};

/// Validation failure of the task graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("task id must not be empty")]
    EmptyId,

    #[error("duplicate task id '{0}'")]
    DuplicateId(TaskId),

    #[error("task '{task}' has unknown dependency '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("task '{0}' cannot depend on itself")]
    SelfDependency(TaskId),

    #[error("cycle detected in task DAG involving task '{task}'")]
    Cycle { task: TaskId },

    #[error("task '{task}' has an invalid retry policy: {reason}")]
    InvalidRetryPolicy { task: TaskId, reason: String },
}

/// Failure of a single attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The attempt exceeded its wall-clock budget. Always retryable.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The work unit reported an error.
    #[error("{0}")]
    Execution(#[from] WorkError),
}

impl TaskError {
    /// Whether another attempt may be made (subject to the retry budget).
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskError::Timeout(_) => true,
            TaskError::Execution(err) => err.kind().is_retryable(),
        }
    }

    /// Whether the work unit reported that it stopped because it was asked to.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskError::Execution(err) if err.is_cancelled())
    }
}

#[derive(Error, Debug)]
pub enum TaskdagError {
    #[error("Graph validation error: {0}")]
    Graph(#[from] GraphError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid transition for task '{task}': {from} -> {to}")]
    InvalidTransition {
        task: TaskId,
        from: TaskState,
        to: TaskState,
    },

    #[error("slot acquisition cancelled")]
    SlotAcquisitionCancelled,

    #[error("orchestrator runtime is no longer running")]
    RuntimeClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TaskdagError>;
