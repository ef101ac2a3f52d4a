#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use taskdag::task::{RetryPolicy, TaskDescriptor, Work};
use taskdag::types::Priority;

use crate::scripted::ScriptedWork;

/// Builder for `TaskDescriptor` to simplify test setup.
///
/// Defaults to work that succeeds immediately with `null`.
pub struct TaskBuilder {
    id: String,
    after: Vec<String>,
    priority: Priority,
    retry: Option<RetryPolicy>,
    timeout: Option<Duration>,
    work: Arc<dyn Work>,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            after: Vec::new(),
            priority: 0,
            retry: None,
            timeout: None,
            work: Arc::new(ScriptedWork::succeed()),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.after.push(dep.to_string());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn work(mut self, work: impl Work + 'static) -> Self {
        self.work = Arc::new(work);
        self
    }

    pub fn build(self) -> TaskDescriptor {
        let mut task = TaskDescriptor::new(self.id, self.work)
            .with_dependencies(self.after)
            .with_priority(self.priority);
        if let Some(policy) = self.retry {
            task = task.with_retry_policy(policy);
        }
        if let Some(timeout) = self.timeout {
            task = task.with_timeout(timeout);
        }
        task
    }
}

/// Shorthand: a task with default work and the given dependencies.
pub fn task(id: &str, after: &[&str]) -> TaskDescriptor {
    after
        .iter()
        .fold(TaskBuilder::new(id), |b, dep| b.after(dep))
        .build()
}

/// The diamond `A -> {B, C} -> D`.
pub fn diamond() -> Vec<TaskDescriptor> {
    vec![
        task("A", &[]),
        task("B", &["A"]),
        task("C", &["A"]),
        task("D", &["B", "C"]),
    ]
}
