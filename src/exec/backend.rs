// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning work
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production executor in one place.
//!
//! - `TokioExecutor` is the default implementation. It runs every attempt
//!   on its own tokio task and reports the outcome as a
//!   [`RuntimeEvent::AttemptFinished`].
//! - Tests can provide their own `ExecutorBackend` that, for example,
//!   records which attempts were dispatched and emits completions directly.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::dag::{AttemptOutcome, ScheduledTask};
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::attempt::run_attempt;
use crate::task::WorkError;

/// One dispatched attempt: the task plus its own cancellation token.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub task: ScheduledTask,
    /// Child of the workflow token; fires on workflow cancellation or when
    /// the attempt times out.
    pub cancel: CancellationToken,
}

/// Trait abstracting how dispatched attempts are executed.
///
/// Every attempt handed to `spawn_attempts` must eventually produce exactly
/// one `AttemptFinished` event on the runtime channel.
pub trait ExecutorBackend: Send {
    fn spawn_attempts(
        &mut self,
        attempts: Vec<Attempt>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production executor backend: one tokio task per attempt.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl TokioExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { runtime_tx }
    }
}

impl ExecutorBackend for TokioExecutor {
    fn spawn_attempts(
        &mut self,
        attempts: Vec<Attempt>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.runtime_tx.clone();

        Box::pin(async move {
            for attempt in attempts {
                tokio::spawn(supervise(attempt, tx.clone()));
            }
            Ok(())
        })
    }
}

/// Run one attempt on an inner task so a panicking work unit turns into a
/// permanent failure instead of a lost completion.
async fn supervise(attempt: Attempt, tx: mpsc::Sender<RuntimeEvent>) {
    let task = attempt.task.id.clone();
    let number = attempt.task.attempt;

    let outcome = match tokio::spawn(run_attempt(attempt.task, attempt.cancel)).await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            error!(task = %task, attempt = number, error = %join_err, "work unit panicked");
            AttemptOutcome::Failed(WorkError::permanent(format!("work unit panicked: {join_err}")).into())
        }
    };

    let event = RuntimeEvent::AttemptFinished {
        task,
        attempt: number,
        outcome,
    };
    if tx.send(event).await.is_err() {
        debug!(attempt = number, "runtime gone before attempt completion was delivered");
    }
}
