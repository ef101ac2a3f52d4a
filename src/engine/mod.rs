// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the execution slot pool
//! - the main runtime event loop that reacts to:
//!   - attempt completions
//!   - retry timers
//!   - workflow cancellation and graph extension requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`Orchestrator`] is the public entry point
//! that wires the two together.

use tokio::sync::oneshot;

use crate::dag::AttemptOutcome;
use crate::errors::GraphError;
use crate::task::TaskDescriptor;
use crate::types::TaskId;

/// Events flowing into the runtime from workers, timers and handles.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// An attempt finished (successfully or not).
    AttemptFinished {
        task: TaskId,
        attempt: u32,
        outcome: AttemptOutcome,
    },
    /// The retry delay of a task elapsed.
    RetryDue { task: TaskId },
    /// The workflow was cancelled.
    CancelRequested,
    /// Register more tasks; the validation result is sent back on `reply`.
    Extend {
        tasks: Vec<TaskDescriptor>,
        reply: oneshot::Sender<Result<(), GraphError>>,
    },
}

pub mod core;
pub mod event_handlers;
pub mod handle;
pub mod observer;
pub mod orchestrator;
pub mod pool;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use handle::WorkflowHandle;
pub use observer::{ChannelObserver, FnObserver, NoopObserver, Observer, TracingObserver};
pub use orchestrator::{Orchestrator, execute};
pub use pool::{SlotPermit, SlotPool};
pub use runtime::Runtime;
