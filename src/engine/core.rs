// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - acquiring slots and handing attempts to the executor
//! - running retry timers and propagating cancellation
//!
//! The core is unit tested without workers, timers or processes.

use crate::dag::{ScheduledTask, Scheduler, TaskRecord};
use crate::engine::RuntimeEvent;
use crate::engine::event_handlers::{
    CoreStep, handle_attempt_finished, handle_cancel, handle_extend, handle_retry_due,
};
use crate::types::{CancelReason, StateTransition};

/// Pure core runtime state.
///
/// It owns the scheduler and nothing else: no timers, no workers, no IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    started: bool,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            started: false,
        }
    }

    /// Seed the ready set. Only the first call has an effect.
    pub fn start(&mut self) -> CoreStep {
        if self.started {
            return CoreStep::default();
        }
        self.started = true;
        self.scheduler.seed().into()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::AttemptFinished {
                task,
                attempt,
                outcome,
            } => handle_attempt_finished(&mut self.scheduler, task, attempt, outcome),
            RuntimeEvent::RetryDue { task } => handle_retry_due(&mut self.scheduler, task),
            RuntimeEvent::CancelRequested => handle_cancel(&mut self.scheduler),
            RuntimeEvent::Extend { tasks, reply } => {
                handle_extend(&mut self.scheduler, tasks, reply)
            }
        }
    }

    /// Move the next ready task to `Running`.
    pub fn next_ready(&mut self) -> Option<(ScheduledTask, StateTransition)> {
        self.scheduler.next_ready()
    }

    pub fn has_ready(&self) -> bool {
        self.scheduler.has_ready()
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn running_count(&self) -> usize {
        self.scheduler.running_count()
    }

    pub fn was_cancelled(&self) -> bool {
        self.scheduler.halt_reason() == Some(&CancelReason::WorkflowCancelled)
    }

    pub fn record(&self, task: &str) -> Option<&TaskRecord> {
        self.scheduler.record(task)
    }

    pub fn records(&self) -> Vec<TaskRecord> {
        self.scheduler.records()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
