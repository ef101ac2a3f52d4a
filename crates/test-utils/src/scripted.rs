use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::Value;
use taskdag::task::{Work, WorkContext, WorkError, WorkFuture, WorkOutput};

/// A work unit that plays back a fixed script, one entry per attempt.
///
/// Once the script is exhausted the last entry repeats. Clones share the
/// invocation counter, so a test can keep one clone and inspect it after
/// the run.
#[derive(Clone)]
pub struct ScriptedWork {
    script: Arc<Vec<Result<WorkOutput, WorkError>>>,
    delay: Duration,
    honour_cancellation: bool,
    calls: Arc<AtomicU32>,
}

impl ScriptedWork {
    pub fn new(script: Vec<Result<WorkOutput, WorkError>>) -> Self {
        let script = if script.is_empty() {
            vec![Ok(Value::Null)]
        } else {
            script
        };
        Self {
            script: Arc::new(script),
            delay: Duration::ZERO,
            honour_cancellation: true,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn succeed() -> Self {
        Self::new(vec![Ok(Value::Null)])
    }

    pub fn succeed_with(output: WorkOutput) -> Self {
        Self::new(vec![Ok(output)])
    }

    /// Every attempt fails with `err`.
    pub fn always(err: WorkError) -> Self {
        Self::new(vec![Err(err)])
    }

    /// The first `failures` attempts fail with `err`, then succeed.
    pub fn fail_then_succeed(failures: u32, err: WorkError) -> Self {
        let mut script: Vec<_> = (0..failures).map(|_| Err(err.clone())).collect();
        script.push(Ok(Value::Null));
        Self::new(script)
    }

    /// Each attempt takes `delay` before reporting its outcome.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keep running through the delay even when cancelled.
    pub fn ignoring_cancellation(mut self) -> Self {
        self.honour_cancellation = false;
        self
    }

    /// Number of attempts so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Work for ScriptedWork {
    fn invoke(&self, ctx: WorkContext) -> WorkFuture<'_> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        let outcome = self.script[n.min(self.script.len() - 1)].clone();
        let delay = self.delay;
        let honour_cancellation = self.honour_cancellation;

        Box::pin(async move {
            if !delay.is_zero() {
                if honour_cancellation {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = ctx.cancelled() => return Err(WorkError::cancelled()),
                    }
                } else {
                    tokio::time::sleep(delay).await;
                }
            }
            outcome
        })
    }
}
