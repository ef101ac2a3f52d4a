// src/engine/handle.rs

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::RuntimeEvent;
use crate::errors::{Result, TaskdagError};
use crate::task::TaskDescriptor;

/// Cloneable control handle for a running workflow.
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    cancel: CancellationToken,
    event_tx: mpsc::Sender<RuntimeEvent>,
}

impl WorkflowHandle {
    pub(crate) fn new(cancel: CancellationToken, event_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { cancel, event_tx }
    }

    /// Cancel the workflow.
    ///
    /// Waiting tasks become `Cancelled`; running attempts are signalled
    /// through their cancellation token and the run ends once they stop.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!("workflow cancellation requested through handle");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Register more tasks with the running workflow.
    ///
    /// Fails with [`TaskdagError::Graph`] if the batch is invalid (nothing is
    /// registered then), or [`TaskdagError::RuntimeClosed`] if the workflow
    /// has already finished.
    pub async fn extend(&self, tasks: Vec<TaskDescriptor>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.event_tx
            .send(RuntimeEvent::Extend { tasks, reply })
            .await
            .map_err(|_| TaskdagError::RuntimeClosed)?;

        rx.await.map_err(|_| TaskdagError::RuntimeClosed)??;
        Ok(())
    }
}
