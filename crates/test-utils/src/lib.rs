pub mod builders;
pub mod fake_executor;
pub mod scripted;

use std::sync::Once;

use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};

use taskdag::types::{StateTransition, TaskState};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Drain every transition currently buffered in an observer channel.
pub fn drain_transitions(rx: &mut mpsc::UnboundedReceiver<StateTransition>) -> Vec<StateTransition> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Replay transitions and return the highest number of tasks that were
/// `Running` at the same time.
pub fn max_running(transitions: &[StateTransition]) -> usize {
    let mut running: usize = 0;
    let mut peak = 0;
    for t in transitions {
        if t.to == TaskState::Running {
            running += 1;
            peak = peak.max(running);
        } else if t.from == TaskState::Running {
            running = running.saturating_sub(1);
        }
    }
    peak
}

/// Task ids in the order they entered `Running` (one entry per attempt).
pub fn dispatch_order(transitions: &[StateTransition]) -> Vec<String> {
    transitions
        .iter()
        .filter(|t| t.to == TaskState::Running)
        .map(|t| t.task.clone())
        .collect()
}
