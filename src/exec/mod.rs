// src/exec/mod.rs

//! Execution layer.
//!
//! This module is responsible for actually running attempts and reporting
//! back to the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   `TokioExecutor` that the runtime uses in production, and which tests
//!   can replace with a fake implementation.
//! - [`attempt`] runs a single attempt: timeout, cancellation token and
//!   outcome classification.
//! - [`command`] is the `ShellCommand` work unit used by workflow files.

pub mod attempt;
pub mod backend;
pub mod command;

pub use attempt::run_attempt;
pub use backend::{Attempt, ExecutorBackend, TokioExecutor};
pub use command::ShellCommand;
