use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use taskdag::dag::AttemptOutcome;
use taskdag::engine::RuntimeEvent;
use taskdag::errors::Result;
use taskdag::exec::{Attempt, ExecutorBackend};
use taskdag::task::WorkError;

/// A fake executor that:
/// - records which attempts were dispatched, in order
/// - never invokes the work units
/// - reports success, or a permanent failure for tasks listed in `failing`,
///   in dispatch order from a spawned sender task.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<(String, u32)>>>,
    failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<(String, u32)>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: HashSet::new(),
        }
    }

    pub fn failing<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing.extend(tasks.into_iter().map(Into::into));
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_attempts(
        &mut self,
        attempts: Vec<Attempt>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let failing = self.failing.clone();

        let mut events = Vec::with_capacity(attempts.len());
        for a in attempts {
            {
                let mut guard = executed.lock().unwrap();
                guard.push((a.task.id.clone(), a.task.attempt));
            }

            let outcome = if failing.contains(&a.task.id) {
                AttemptOutcome::Failed(WorkError::permanent("scripted failure").into())
            } else {
                AttemptOutcome::Succeeded(serde_json::Value::Null)
            };
            events.push(RuntimeEvent::AttemptFinished {
                task: a.task.id.clone(),
                attempt: a.task.attempt,
                outcome,
            });
        }

        // The runtime awaits this call and is the only reader of the
        // channel, so completions are sent from a separate task.
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Box::pin(async { Ok(()) })
    }
}
