// src/task/work.rs

//! The work capability.
//!
//! A work unit is anything that can be invoked with a [`WorkContext`] and
//! eventually yields either a [`WorkOutput`] or a classified [`WorkError`].
//! The orchestrator never looks inside the output. Concrete kinds (closures
//! via [`FnWork`], shell commands via [`crate::exec::ShellCommand`], ...)
//! are all just implementations of [`Work`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::TaskId;

/// Value produced by a successful attempt.
pub type WorkOutput = serde_json::Value;

/// Boxed future returned by [`Work::invoke`].
pub type WorkFuture<'a> = Pin<Box<dyn Future<Output = Result<WorkOutput, WorkError>> + Send + 'a>>;

/// Trait implemented by every executable unit of work.
pub trait Work: Send + Sync {
    /// Run one attempt.
    ///
    /// Implementations should watch `ctx.cancellation()` and return
    /// [`WorkError::cancelled`] promptly once it fires.
    fn invoke(&self, ctx: WorkContext) -> WorkFuture<'_>;
}

/// Everything an attempt is told about its surroundings.
#[derive(Debug, Clone)]
pub struct WorkContext {
    task_id: TaskId,
    attempt: u32,
    cancel: CancellationToken,
}

impl WorkContext {
    pub fn new(task_id: TaskId, attempt: u32, cancel: CancellationToken) -> Self {
        Self {
            task_id,
            attempt,
            cancel,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the attempt has been asked to stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// How the orchestrator should treat a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient; another attempt may succeed.
    Retryable,
    /// Retrying will not help.
    Permanent,
    /// The work unit did not say. Treated like `Permanent`.
    Unclassified,
    /// The attempt stopped because cancellation was requested.
    Cancelled,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Retryable => "retryable",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Unclassified => "unclassified",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Error reported by a work unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct WorkError {
    kind: ErrorKind,
    message: String,
}

impl WorkError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Retryable, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unclassified, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "attempt cancelled")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl From<anyhow::Error> for WorkError {
    fn from(err: anyhow::Error) -> Self {
        WorkError::unclassified(format!("{err:#}"))
    }
}

/// Adapter turning an async closure into a [`Work`] unit.
pub struct FnWork<F> {
    f: F,
}

impl<F> FnWork<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Work for FnWork<F>
where
    F: Fn(WorkContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<WorkOutput, WorkError>> + Send + 'static,
{
    fn invoke(&self, ctx: WorkContext) -> WorkFuture<'_> {
        Box::pin((self.f)(ctx))
    }
}

/// Convenience: wrap an async closure as a shareable work handle.
///
/// ```ignore
/// let work = work_fn(|ctx| async move {
///     tracing::info!(task = ctx.task_id(), "hello");
///     Ok(serde_json::json!("done"))
/// });
/// ```
pub fn work_fn<F, Fut>(f: F) -> Arc<dyn Work>
where
    F: Fn(WorkContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WorkOutput, WorkError>> + Send + 'static,
{
    Arc::new(FnWork::new(f))
}
