// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::dag::{AttemptOutcome, Scheduler, SchedulerStep};
use crate::errors::GraphError;
use crate::task::TaskDescriptor;
use crate::types::{StateTransition, TaskId};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Post a `RetryDue` event for `task` once `delay` has elapsed.
    ScheduleRetry { task: TaskId, delay: Duration },
    /// Close the slot pool and signal every running attempt to stop.
    SignalCancellation,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    /// State changes to report to observers, in order.
    pub transitions: Vec<StateTransition>,
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
}

impl From<SchedulerStep> for CoreStep {
    fn from(step: SchedulerStep) -> Self {
        let commands = step
            .retry
            .map(|r| CoreCommand::ScheduleRetry {
                task: r.task,
                delay: r.delay,
            })
            .into_iter()
            .collect();
        Self {
            transitions: step.transitions,
            commands,
        }
    }
}

/// Handle the end of one attempt.
pub fn handle_attempt_finished(
    scheduler: &mut Scheduler,
    task: TaskId,
    attempt: u32,
    outcome: AttemptOutcome,
) -> CoreStep {
    scheduler.step_completion(&task, attempt, outcome).into()
}

/// Handle an elapsed retry delay.
pub fn handle_retry_due(scheduler: &mut Scheduler, task: TaskId) -> CoreStep {
    scheduler.step_retry_due(&task).into()
}

/// Handle workflow cancellation.
///
/// Waiting tasks are cancelled right away; running attempts are signalled
/// and finish through the normal completion path.
pub fn handle_cancel(scheduler: &mut Scheduler) -> CoreStep {
    let mut step: CoreStep = scheduler.step_cancel().into();
    if scheduler.running_count() > 0 {
        step.commands.push(CoreCommand::SignalCancellation);
    }
    step
}

/// Handle a graph extension request and answer it on `reply`.
pub fn handle_extend(
    scheduler: &mut Scheduler,
    tasks: Vec<TaskDescriptor>,
    reply: oneshot::Sender<Result<(), GraphError>>,
) -> CoreStep {
    let (step, result) = match scheduler.step_extend(tasks) {
        Ok(step) => (step.into(), Ok(())),
        Err(err) => {
            warn!(error = %err, "rejecting workflow extension");
            (CoreStep::default(), Err(err))
        }
    };

    if reply.send(result).is_err() {
        debug!("extension requester went away before the reply");
    }
    step
}
