#![allow(dead_code, unused_imports)]

pub use taskdag_test_utils::builders::{TaskBuilder, diamond, task};
pub use taskdag_test_utils::fake_executor::FakeExecutor;
pub use taskdag_test_utils::scripted::ScriptedWork;
pub use taskdag_test_utils::{dispatch_order, drain_transitions, init_tracing, max_running, with_timeout};

use taskdag::OrchestratorConfig;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Config with the given slot count and everything else at its default.
pub fn config(max_concurrent_tasks: usize) -> OrchestratorConfig {
    OrchestratorConfig::default().with_max_concurrent_tasks(max_concurrent_tasks)
}
