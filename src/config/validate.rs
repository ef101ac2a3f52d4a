// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::duration::parse_duration;
use crate::config::model::{
    OrchestratorConfig, RawRetryConfig, RawTaskConfig, RawWorkflowFile, TaskSpec, WorkflowFile,
};
use crate::dag::DependencyGraph;
use crate::errors::{Result, TaskdagError};
use crate::task::RetryPolicy;

impl TryFrom<RawWorkflowFile> for WorkflowFile {
    type Error = TaskdagError;

    fn try_from(raw: RawWorkflowFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        let config = validate_global_config(&raw)?;
        let tasks = validate_tasks(&raw.task, &config.default_retry_policy)?;
        validate_dag(&tasks)?;
        Ok(WorkflowFile { config, tasks })
    }
}

fn config_error(msg: impl Into<String>) -> TaskdagError {
    TaskdagError::ConfigError(msg.into())
}

fn ensure_has_tasks(raw: &RawWorkflowFile) -> Result<()> {
    if raw.task.is_empty() {
        return Err(config_error(
            "workflow must contain at least one [task.<name>] section",
        ));
    }
    Ok(())
}

fn validate_global_config(raw: &RawWorkflowFile) -> Result<OrchestratorConfig> {
    let section = &raw.config;

    let default_retry_policy = match &section.default_retry {
        Some(retry) => retry_policy(retry, &RetryPolicy::default())
            .map_err(|e| config_error(format!("[config.default_retry]: {e}")))?,
        None => RetryPolicy::default(),
    };

    let config = OrchestratorConfig {
        max_concurrent_tasks: section.max_concurrent_tasks,
        fail_fast: section.fail_fast,
        default_retry_policy,
    };
    config
        .validate()
        .map_err(|e| config_error(format!("[config]: {e}")))?;
    Ok(config)
}

fn validate_tasks(
    raw: &BTreeMap<String, RawTaskConfig>,
    default_retry: &RetryPolicy,
) -> Result<BTreeMap<String, TaskSpec>> {
    raw.iter()
        .map(|(name, task)| {
            let spec = task_spec(task, default_retry)
                .map_err(|e| config_error(format!("[task.{name}]: {e}")))?;
            Ok((name.clone(), spec))
        })
        .collect()
}

fn task_spec(task: &RawTaskConfig, default_retry: &RetryPolicy) -> std::result::Result<TaskSpec, String> {
    if task.cmd.trim().is_empty() {
        return Err("cmd must not be empty".to_string());
    }

    let retry = task
        .retry
        .as_ref()
        .map(|r| retry_policy(r, default_retry))
        .transpose()?;
    let timeout = task
        .timeout
        .as_deref()
        .map(|t| parse_duration(t).map_err(|e| format!("timeout: {e}")))
        .transpose()?;

    Ok(TaskSpec {
        cmd: task.cmd.clone(),
        after: task.after.clone(),
        priority: task.priority,
        retry,
        timeout,
    })
}

/// Overlay the fields present in `raw` on `base`.
fn retry_policy(raw: &RawRetryConfig, base: &RetryPolicy) -> std::result::Result<RetryPolicy, String> {
    let backoff_base = match raw.backoff_base.as_deref() {
        Some(s) => parse_duration(s).map_err(|e| format!("backoff_base: {e}"))?,
        None => base.backoff_base(),
    };
    let max_delay = match raw.max_delay.as_deref() {
        Some(s) => parse_duration(s).map_err(|e| format!("max_delay: {e}"))?,
        None => base.max_delay(),
    };

    let policy = RetryPolicy::exponential(
        raw.max_attempts.unwrap_or(base.max_attempts()),
        backoff_base,
        raw.backoff_multiplier.unwrap_or(base.backoff_multiplier()),
    )
    .with_max_delay(max_delay)
    .with_jitter(raw.jitter.unwrap_or(base.jitter()));

    policy.validate()?;
    Ok(policy)
}

/// Unknown `after` entries, self references and cycles, using the same
/// checks the orchestrator applies at startup.
fn validate_dag(tasks: &BTreeMap<String, TaskSpec>) -> Result<()> {
    DependencyGraph::from_edges(
        tasks
            .iter()
            .map(|(name, spec)| (name.clone(), spec.after.clone())),
    )?;
    Ok(())
}
