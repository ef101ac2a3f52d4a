// src/task/descriptor.rs

//! Immutable description of one schedulable unit of work.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::task::retry::RetryPolicy;
use crate::task::work::Work;
use crate::types::{Priority, TaskId};

/// A task as registered with the orchestrator.
///
/// Built with [`TaskDescriptor::new`] plus the `with_*` / [`depends_on`]
/// methods; once handed to the orchestrator it is never modified.
///
/// [`depends_on`]: TaskDescriptor::depends_on
#[derive(Clone)]
pub struct TaskDescriptor {
    id: TaskId,
    dependencies: Vec<TaskId>,
    priority: Priority,
    retry_policy: Option<RetryPolicy>,
    timeout: Option<Duration>,
    work: Arc<dyn Work>,
}

impl TaskDescriptor {
    pub fn new(id: impl Into<TaskId>, work: Arc<dyn Work>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            priority: 0,
            retry_policy: None,
            timeout: None,
            work,
        }
    }

    /// Add a dependency. Duplicates are ignored.
    pub fn depends_on(mut self, dependency: impl Into<TaskId>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn with_dependencies<I, S>(self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        dependencies
            .into_iter()
            .fold(self, |task, dep| task.depends_on(dep))
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Override the orchestrator's default retry policy for this task.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Per-attempt wall-clock budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn work(&self) -> &Arc<dyn Work> {
        &self.work
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("priority", &self.priority)
            .field("retry_policy", &self.retry_policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
