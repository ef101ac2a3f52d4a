// src/config/model.rs

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::ShellCommand;
use crate::task::{RetryPolicy, TaskDescriptor};
use crate::types::Priority;

/// Largest slot count the pool can hold.
pub const MAX_CONCURRENT_TASKS: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Capacity of the execution slot pool.
    pub max_concurrent_tasks: usize,
    /// Stop admitting work after the first terminal failure.
    pub fail_fast: bool,
    /// Used by tasks that do not carry their own retry policy.
    pub default_retry_policy: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            fail_fast: false,
            default_retry_policy: RetryPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_tasks == 0 {
            return Err("max_concurrent_tasks must be >= 1 (got 0)".to_string());
        }
        if self.max_concurrent_tasks > MAX_CONCURRENT_TASKS {
            return Err(format!(
                "max_concurrent_tasks must be <= {MAX_CONCURRENT_TASKS} (got {})",
                self.max_concurrent_tasks
            ));
        }
        self.default_retry_policy
            .validate()
            .map_err(|e| format!("default retry policy: {e}"))
    }
}

/// Workflow file as read from TOML.
///
/// ```toml
/// [config]
/// max_concurrent_tasks = 2
/// fail_fast = false
///
/// [config.default_retry]
/// max_attempts = 3
/// backoff_base = "100ms"
///
/// [task.build]
/// cmd = "cargo build"
/// timeout = "5m"
///
/// [task.test]
/// cmd = "cargo test"
/// after = ["build"]
/// retry = { max_attempts = 2 }
/// ```
///
/// All sections except the tasks are optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWorkflowFile {
    /// Global settings from `[config]`.
    #[serde(default)]
    pub config: RawConfigSection,

    /// All tasks from `[task.<name>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, RawTaskConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigSection {
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    #[serde(default)]
    pub fail_fast: bool,

    /// `[config.default_retry]`.
    #[serde(default)]
    pub default_retry: Option<RawRetryConfig>,
}

fn default_max_concurrent_tasks() -> usize {
    4
}

impl Default for RawConfigSection {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            fail_fast: false,
            default_retry: None,
        }
    }
}

/// Retry settings. Missing fields inherit from the enclosing default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRetryConfig {
    pub max_attempts: Option<u32>,
    /// Duration string, e.g. `"100ms"`.
    pub backoff_base: Option<String>,
    pub backoff_multiplier: Option<f64>,
    /// Duration string capping a single delay.
    pub max_delay: Option<String>,
    pub jitter: Option<bool>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTaskConfig {
    /// The shell command to execute.
    pub cmd: String,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub retry: Option<RawRetryConfig>,

    /// Per-attempt timeout as a duration string.
    #[serde(default)]
    pub timeout: Option<String>,
}

/// A validated workflow file.
///
/// Only constructed through `TryFrom<RawWorkflowFile>`.
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    pub config: OrchestratorConfig,
    /// Tasks keyed by id (alphabetical order is registration order).
    pub tasks: BTreeMap<String, TaskSpec>,
}

/// A validated `[task.<name>]` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub cmd: String,
    pub after: Vec<String>,
    pub priority: Priority,
    /// `None` means the workflow's default retry policy.
    pub retry: Option<RetryPolicy>,
    pub timeout: Option<Duration>,
}

impl WorkflowFile {
    /// Turn every task into a [`ShellCommand`] descriptor, run from
    /// `working_dir` if given.
    pub fn descriptors(&self, working_dir: Option<&Path>) -> Vec<TaskDescriptor> {
        self.tasks
            .iter()
            .map(|(id, spec)| {
                let mut cmd = ShellCommand::new(spec.cmd.clone());
                if let Some(dir) = working_dir {
                    cmd = cmd.with_working_dir(dir);
                }

                let mut task = TaskDescriptor::new(id.clone(), Arc::new(cmd))
                    .with_dependencies(spec.after.iter().cloned())
                    .with_priority(spec.priority);
                if let Some(policy) = &spec.retry {
                    task = task.with_retry_policy(policy.clone());
                }
                if let Some(timeout) = spec.timeout {
                    task = task.with_timeout(timeout);
                }
                task
            })
            .collect()
    }
}
