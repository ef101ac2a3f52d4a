// src/exec/attempt.rs

//! Running a single attempt.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dag::{AttemptOutcome, ScheduledTask};
use crate::errors::TaskError;
use crate::task::WorkContext;

/// Invoke the task's work once, enforcing its timeout.
///
/// On timeout the attempt's token is cancelled so that anything the work
/// unit started in the background can stop too.
pub async fn run_attempt(task: ScheduledTask, cancel: CancellationToken) -> AttemptOutcome {
    let ScheduledTask {
        id,
        attempt,
        work,
        timeout,
    } = task;

    info!(task = %id, attempt, ?timeout, "starting attempt");
    let ctx = WorkContext::new(id.clone(), attempt, cancel.clone());
    let invocation = work.invoke(ctx);

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, invocation).await {
            Ok(result) => result.map_err(TaskError::from),
            Err(_) => {
                cancel.cancel();
                Err(TaskError::Timeout(limit))
            }
        },
        None => invocation.await.map_err(TaskError::from),
    };

    match result {
        Ok(output) => {
            info!(task = %id, attempt, "attempt succeeded");
            AttemptOutcome::Succeeded(output)
        }
        Err(err) => {
            warn!(task = %id, attempt, error = %err, retryable = err.is_retryable(), "attempt failed");
            AttemptOutcome::Failed(err)
        }
    }
}
