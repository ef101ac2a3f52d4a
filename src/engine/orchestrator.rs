// src/engine/orchestrator.rs

//! Public entry point: validate a task set, then run it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::OrchestratorConfig;
use crate::dag::Scheduler;
use crate::engine::core::CoreRuntime;
use crate::engine::handle::WorkflowHandle;
use crate::engine::observer::{NoopObserver, Observer};
use crate::engine::pool::SlotPool;
use crate::engine::runtime::Runtime;
use crate::engine::RuntimeEvent;
use crate::errors::{Result, TaskdagError};
use crate::exec::{ExecutorBackend, TokioExecutor};
use crate::report::Report;
use crate::task::TaskDescriptor;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A validated, runnable workflow.
///
/// ```ignore
/// let orchestrator = Orchestrator::new(tasks, OrchestratorConfig::default())?;
/// let handle = orchestrator.handle();
/// let report = orchestrator.run().await?;
/// ```
pub struct Orchestrator {
    scheduler: Scheduler,
    config: OrchestratorConfig,
    observer: Arc<dyn Observer>,
    cancel: CancellationToken,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Validate the config and the task graph.
    ///
    /// Nothing runs if this fails.
    pub fn new(tasks: Vec<TaskDescriptor>, config: OrchestratorConfig) -> Result<Self> {
        config.validate().map_err(TaskdagError::ConfigError)?;
        let scheduler = Scheduler::new(tasks, &config)?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        debug!(
            tasks = scheduler.graph().len(),
            max_concurrent = config.max_concurrent_tasks,
            fail_fast = config.fail_fast,
            "orchestrator ready"
        );
        Ok(Self {
            scheduler,
            config,
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
            event_tx,
            event_rx,
        })
    }

    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Handle for cancelling or extending the workflow while it runs.
    pub fn handle(&self) -> WorkflowHandle {
        WorkflowHandle::new(self.cancel.clone(), self.event_tx.clone())
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run every task to a terminal state on the tokio executor.
    pub async fn run(self) -> Result<Report> {
        self.run_with_executor(TokioExecutor::new).await
    }

    /// Run with a custom executor backend, built from the runtime's event
    /// sender.
    pub async fn run_with_executor<E, F>(self, make_executor: F) -> Result<Report>
    where
        E: ExecutorBackend,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
    {
        let pool = SlotPool::new(self.config.max_concurrent_tasks)?;
        let executor = make_executor(self.event_tx.clone());
        let runtime = Runtime::new(
            CoreRuntime::new(self.scheduler),
            pool,
            self.event_tx,
            self.event_rx,
            executor,
            self.cancel,
            self.observer,
        );
        runtime.run().await
    }
}

/// Validate `tasks` and run them to completion.
pub async fn execute(tasks: Vec<TaskDescriptor>, config: OrchestratorConfig) -> Result<Report> {
    Orchestrator::new(tasks, config)?.run().await
}
