// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the validated dependency graph of tasks.
//! - [`validate`] contains the structural checks run before nodes enter it.
//! - [`record`] is the per-task execution record.
//! - [`state_manager`] is the task state machine.
//! - [`ready_queue`] orders ready tasks for dispatch.
//! - [`scheduler`] ties them together; it decides which tasks run next and
//!   how attempt outcomes propagate.
//! - [`scheduler_step`] defines the result types for scheduler steps.

pub mod graph;
pub mod ready_queue;
pub mod record;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub(crate) mod validate;

pub use graph::DependencyGraph;
pub use ready_queue::ReadyQueue;
pub use record::TaskRecord;
pub use scheduler::Scheduler;
pub use scheduler_step::{AttemptOutcome, RetryScheduled, ScheduledTask, SchedulerStep};
pub use state_manager::{StateManager, is_valid_transition};
