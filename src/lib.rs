// src/lib.rs

//! Dependency-aware task orchestration.
//!
//! Register [`TaskDescriptor`]s, build an [`Orchestrator`] and run it: tasks
//! start once all their dependencies succeeded, at most
//! `max_concurrent_tasks` at a time, with per-task retry and timeout. The
//! result is a [`Report`].

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod report;
pub mod task;
pub mod types;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{WorkflowFile, load_and_validate};
use crate::dag::DependencyGraph;

pub use crate::config::OrchestratorConfig;
pub use crate::engine::{Orchestrator, WorkflowHandle, execute};
pub use crate::errors::{GraphError, TaskError, TaskdagError};
pub use crate::report::Report;
pub use crate::task::{RetryPolicy, TaskDescriptor, Work, WorkContext, WorkError, work_fn};
pub use crate::types::{TaskId, TaskState};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - workflow loading and CLI overrides
/// - the orchestrator and its tokio executor
/// - Ctrl-C handling
///
/// Returns whether every task succeeded.
pub async fn run(args: CliArgs) -> Result<bool> {
    let mut workflow = load_and_validate(&args.workflow)
        .with_context(|| format!("loading workflow {}", args.workflow.display()))?;

    if let Some(max) = args.max_concurrent {
        workflow.config.max_concurrent_tasks = max;
    }
    if args.fail_fast {
        workflow.config.fail_fast = true;
    }

    if args.dry_run {
        print_dry_run(&workflow)?;
        return Ok(true);
    }

    let working_dir = workflow_root_dir(&args.workflow);
    let tasks = workflow.descriptors(Some(&working_dir));
    let orchestrator = Orchestrator::new(tasks, workflow.config.clone())?
        .with_observer(engine::TracingObserver);

    // Ctrl-C → cancel the workflow; running commands are killed.
    {
        let handle = orchestrator.handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            handle.cancel();
        });
    }

    let report = orchestrator.run().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(report.is_success())
}

/// Directory commands run in.
///
/// - If the workflow path has a non-empty parent (e.g. "ci/Taskdag.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Taskdag.toml" (parent = ""),
///   we fall back to the current working directory "."
fn workflow_root_dir(workflow_path: &Path) -> PathBuf {
    match workflow_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Simple dry-run output: print config and tasks in topological order.
fn print_dry_run(workflow: &WorkflowFile) -> Result<()> {
    let graph = DependencyGraph::from_edges(
        workflow
            .tasks
            .iter()
            .map(|(id, spec)| (id.clone(), spec.after.clone())),
    )?;

    println!("taskdag dry-run");
    println!(
        "  config.max_concurrent_tasks = {}",
        workflow.config.max_concurrent_tasks
    );
    println!("  config.fail_fast = {}", workflow.config.fail_fast);
    println!(
        "  config.default_retry.max_attempts = {}",
        workflow.config.default_retry_policy.max_attempts()
    );
    println!();

    println!("tasks ({}):", workflow.tasks.len());
    for id in graph.topological_order() {
        let Some(spec) = workflow.tasks.get(id) else {
            continue;
        };
        println!("  - {id} (stage {})", graph.stage_of(id).unwrap_or(0));
        println!("      cmd: {}", spec.cmd);
        if !spec.after.is_empty() {
            println!("      after: {:?}", spec.after);
        }
        if spec.priority != 0 {
            println!("      priority: {}", spec.priority);
        }
        if let Some(retry) = &spec.retry {
            println!("      max_attempts: {}", retry.max_attempts());
        }
        if let Some(timeout) = spec.timeout {
            println!("      timeout: {timeout:?}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

fn print_summary(report: &Report) {
    for task in report.tasks.iter() {
        let mut line = format!("{:<10} {}", task.state.as_str(), task.id);
        if task.attempts > 1 {
            line.push_str(&format!(" (attempts: {})", task.attempts));
        }
        if let Some(reason) = &task.cancel_reason {
            line.push_str(&format!(" [{reason}]"));
        } else if let Some(err) = &task.error {
            line.push_str(&format!(" [{err}]"));
        }
        println!("{line}");
    }

    info!(
        succeeded = report.counts.succeeded,
        failed = report.counts.failed,
        cancelled = report.counts.cancelled,
        wall_time = ?report.wall_time,
        "run complete"
    );
    if let Some(fatal) = &report.first_fatal_error {
        println!("first failure: {}: {}", fatal.task, fatal.error);
    }
}
