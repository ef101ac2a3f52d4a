// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{Result, TaskdagError};
use crate::exec::{Attempt, ExecutorBackend};
use crate::report::{Report, ResultAggregator, TaskSummary};
use crate::types::{StateTransition, TaskId};

use super::core::CoreRuntime;
use super::observer::Observer;
use super::pool::{SlotPermit, SlotPool};
use super::{CoreCommand, CoreStep, RuntimeEvent};

/// Slot and cancellation token held by a running attempt.
struct InFlight {
    permit: SlotPermit,
    cancel: CancellationToken,
}

/// Drives the scheduler in response to `RuntimeEvent`s, and delegates
/// attempt execution to an `ExecutorBackend`.
///
/// This is an IO shell around `CoreRuntime`, which contains all the
/// scheduling semantics. This struct handles async IO: acquiring slots,
/// reading events from channels, retry timers and cancellation signals.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    pool: SlotPool,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    cancel: CancellationToken,
    observer: Arc<dyn Observer>,
    in_flight: HashMap<TaskId, InFlight>,
    aggregator: ResultAggregator,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("pool", &self.pool)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        pool: SlotPool,
        event_tx: mpsc::Sender<RuntimeEvent>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        cancel: CancellationToken,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            core,
            pool,
            event_tx,
            event_rx,
            executor,
            cancel,
            observer,
            in_flight: HashMap::new(),
            aggregator: ResultAggregator::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Dispatches ready tasks while slots are free.
    /// - Consumes `RuntimeEvent`s and the workflow cancellation signal.
    /// - Feeds them into the core runtime and executes the returned commands.
    ///
    /// Returns once every task is terminal.
    pub async fn run(mut self) -> Result<Report> {
        info!(
            tasks = self.core.scheduler().graph().len(),
            capacity = self.pool.capacity(),
            "taskdag runtime started"
        );

        let step = self.core.start();
        self.apply(step);

        let workflow_cancel = self.cancel.clone();
        let mut cancel_seen = workflow_cancel.is_cancelled();
        if cancel_seen {
            // Cancelled before the first dispatch: nothing gets to run.
            let step = self.core.step(RuntimeEvent::CancelRequested);
            self.apply(step);
        }

        loop {
            self.dispatch_ready().await?;

            if self.core.is_finished() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = workflow_cancel.cancelled(), if !cancel_seen => Some(RuntimeEvent::CancelRequested),
                event = self.event_rx.recv() => event,
            };

            let Some(event) = next else {
                warn!("runtime event channel closed; exiting");
                break;
            };

            match &event {
                RuntimeEvent::CancelRequested => cancel_seen = true,
                RuntimeEvent::AttemptFinished { task, attempt, .. } => {
                    // Release the slot before the state machine sees the outcome.
                    match self.in_flight.remove(task) {
                        Some(running) => self.pool.release(running.permit),
                        None => {
                            warn!(task = %task, attempt, "completion for attempt that is not in flight")
                        }
                    }
                }
                _ => {}
            }

            debug!(?event, "runtime received event");
            let step = self.core.step(event);
            self.apply(step);
        }

        let report = self.aggregator.finish(self.core.was_cancelled());
        info!(
            succeeded = report.counts.succeeded,
            failed = report.counts.failed,
            cancelled = report.counts.cancelled,
            wall_time = ?report.wall_time,
            "workflow finished"
        );
        Ok(report)
    }

    /// Pop ready tasks while slots are free and hand them to the executor.
    ///
    /// Slots only come back when a completion is received, so this never
    /// waits on a full pool. Once the workflow token fires nothing more is
    /// dispatched, even before `CancelRequested` reaches the core.
    async fn dispatch_ready(&mut self) -> Result<()> {
        let mut attempts = Vec::new();

        while self.core.has_ready() {
            if self.pool.available() == 0 {
                debug!(in_use = self.pool.in_use(), "no free slot; deferring dispatch");
                break;
            }
            let permit = match self.pool.acquire_or_cancel(&self.cancel).await {
                Ok(permit) => permit,
                Err(TaskdagError::SlotAcquisitionCancelled) => {
                    debug!("workflow cancelled; dispatch stopped");
                    break;
                }
                Err(e) => return Err(e),
            };
            let Some((task, transition)) = self.core.next_ready() else {
                break;
            };
            self.observe(&transition);

            let cancel = self.cancel.child_token();
            self.in_flight.insert(
                task.id.clone(),
                InFlight {
                    permit,
                    cancel: cancel.clone(),
                },
            );
            attempts.push(Attempt { task, cancel });
        }

        if attempts.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = attempts.iter().map(|a| a.task.id.as_str()).collect();
        debug!(?ids, "spawning attempts");
        self.executor.spawn_attempts(attempts).await
    }

    fn apply(&mut self, step: CoreStep) {
        for transition in step.transitions.iter() {
            self.observe(transition);
        }
        for command in step.commands {
            self.execute_command(command);
        }
    }

    fn observe(&mut self, transition: &StateTransition) {
        self.observer.on_transition(transition);
        if transition.to.is_terminal()
            && let Some(record) = self.core.record(&transition.task)
        {
            self.aggregator.record(TaskSummary::from(record));
        }
    }

    /// Execute a single command from the core.
    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::ScheduleRetry { task, delay } => {
                debug!(task = %task, ?delay, "arming retry timer");
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    // The runtime may already be gone after a cancellation.
                    let _ = tx.send(RuntimeEvent::RetryDue { task }).await;
                });
            }
            CoreCommand::SignalCancellation => {
                self.pool.close();
                for (task, running) in self.in_flight.iter() {
                    debug!(task = %task, "signalling cancellation to running attempt");
                    running.cancel.cancel();
                }
            }
        }
    }
}
