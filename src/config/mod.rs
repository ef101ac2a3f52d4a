// src/config/mod.rs

//! Orchestrator settings and workflow files.
//!
//! - [`model`] holds [`OrchestratorConfig`] and the TOML workflow model.
//! - [`loader`] reads workflow files from disk.
//! - [`validate`] turns the raw model into a checked [`WorkflowFile`].
//! - [`duration`] parses `"<n>ms|s|m|h"` strings.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_workflow_path, load_and_validate, load_from_path};
pub use model::{MAX_CONCURRENT_TASKS, OrchestratorConfig, RawWorkflowFile, TaskSpec, WorkflowFile};
