// src/engine/observer.rs

//! Progress hook: receives every task state transition as it happens.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::types::{StateTransition, TaskState};

/// Receives state transitions from the runtime loop.
///
/// Called synchronously from the loop, so implementations must not block.
pub trait Observer: Send + Sync {
    fn on_transition(&self, transition: &StateTransition);
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_transition(&self, _transition: &StateTransition) {}
}

/// Logs each transition through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_transition(&self, t: &StateTransition) {
        match t.to {
            TaskState::Failed => {
                warn!(task = %t.task, attempt = t.attempt, from = %t.from, "task -> failed")
            }
            TaskState::Succeeded | TaskState::Cancelled => {
                info!(task = %t.task, attempt = t.attempt, from = %t.from, to = %t.to, "task finished")
            }
            _ => debug!(task = %t.task, attempt = t.attempt, from = %t.from, to = %t.to, "task transition"),
        }
    }
}

/// Forwards transitions over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StateTransition>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<StateTransition>) -> Self {
        Self { tx }
    }

    /// Create an observer together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StateTransition>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Observer for ChannelObserver {
    fn on_transition(&self, transition: &StateTransition) {
        // Receiver gone: nobody is listening any more.
        let _ = self.tx.send(transition.clone());
    }
}

/// Adapter for closures.
pub struct FnObserver<F>(pub F);

impl<F> Observer for FnObserver<F>
where
    F: Fn(&StateTransition) + Send + Sync,
{
    fn on_transition(&self, transition: &StateTransition) {
        (self.0)(transition)
    }
}
