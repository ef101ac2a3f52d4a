// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::errors::Result;

/// Load a workflow file from a given path and return the raw `RawWorkflowFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (DAG correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let workflow: RawWorkflowFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), tasks = workflow.task.len(), "workflow file parsed");

    Ok(workflow)
}

/// Load a workflow file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - at least one task,
///   - slot capacity and retry settings,
///   - duration strings,
///   - unknown `after` references, self references and cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowFile> {
    let raw = load_from_path(&path)?;
    WorkflowFile::try_from(raw)
}

/// Workflow file used when none is given on the command line.
pub fn default_workflow_path() -> PathBuf {
    PathBuf::from("Taskdag.toml")
}
