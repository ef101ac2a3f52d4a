// tests/runtime_behaviour.rs

mod common;
use crate::common::{
    FakeExecutor, ScriptedWork, TaskBuilder, TestResult, config, diamond, init_tracing, task,
    with_timeout,
};

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use taskdag::dag::{AttemptOutcome, Scheduler};
use taskdag::report::Report;
use taskdag::types::{CancelReason, TaskState};
use taskdag::{
    GraphError, Orchestrator, OrchestratorConfig, RetryPolicy, TaskDescriptor, TaskdagError,
    WorkError, WorkflowHandle, execute, work_fn,
};

#[tokio::test(start_paused = true)]
async fn timed_out_attempts_are_retried_until_budget_is_spent() -> TestResult {
    init_tracing();

    let work = ScriptedWork::succeed().with_delay(Duration::from_secs(3600));
    let tasks = vec![
        TaskBuilder::new("hang")
            .work(work.clone())
            .timeout(Duration::from_millis(50))
            .retry(RetryPolicy::fixed(3, Duration::from_millis(10)))
            .build(),
    ];

    let report = execute(tasks, config(1)).await?;

    let hang = report.task("hang").ok_or("missing task")?;
    assert_eq!(hang.state, TaskState::Failed);
    assert_eq!(hang.attempts, 3);
    assert_eq!(work.calls(), 3);
    assert!(hang.error.as_deref().unwrap_or_default().contains("timed out"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retryable_errors_use_exactly_the_attempt_budget() -> TestResult {
    init_tracing();

    let work = ScriptedWork::always(WorkError::retryable("still flaky"));
    let tasks = vec![
        TaskBuilder::new("flaky")
            .work(work.clone())
            .retry(RetryPolicy::exponential(4, Duration::from_millis(5), 2.0))
            .build(),
    ];

    let report = execute(tasks, config(1)).await?;

    assert_eq!(report.state_of("flaky"), Some(TaskState::Failed));
    assert_eq!(report.task("flaky").map(|t| t.attempts), Some(4));
    assert_eq!(work.calls(), 4);
    Ok(())
}

#[tokio::test]
async fn permanent_and_unclassified_errors_are_not_retried() -> TestResult {
    init_tracing();

    let permanent = ScriptedWork::always(WorkError::permanent("bad input"));
    let unclassified = ScriptedWork::always(WorkError::unclassified("who knows"));
    let policy = RetryPolicy::fixed(5, Duration::from_millis(1));
    let tasks = vec![
        TaskBuilder::new("permanent")
            .work(permanent.clone())
            .retry(policy.clone())
            .build(),
        TaskBuilder::new("unclassified")
            .work(unclassified.clone())
            .retry(policy)
            .build(),
    ];

    let report = with_timeout(execute(tasks, config(2))).await?;

    for id in ["permanent", "unclassified"] {
        let t = report.task(id).ok_or("missing task")?;
        assert_eq!(t.state, TaskState::Failed);
        assert_eq!(t.attempts, 1);
    }
    assert_eq!(permanent.calls(), 1);
    assert_eq!(unclassified.calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn workflow_default_retry_applies_to_tasks_without_a_policy() -> TestResult {
    init_tracing();

    let work = ScriptedWork::fail_then_succeed(2, WorkError::retryable("busy"));
    let cfg = config(1).with_default_retry_policy(RetryPolicy::fixed(3, Duration::from_millis(5)));

    let report = execute(vec![TaskBuilder::new("t").work(work.clone()).build()], cfg).await?;

    assert!(report.is_success());
    assert_eq!(work.calls(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn fail_fast_cancels_waiting_tasks_and_lets_running_ones_finish() -> TestResult {
    init_tracing();

    let tasks = vec![
        TaskBuilder::new("bad")
            .priority(10)
            .work(ScriptedWork::always(WorkError::permanent("boom")))
            .build(),
        TaskBuilder::new("slow")
            .priority(5)
            .work(ScriptedWork::succeed().with_delay(Duration::from_millis(200)))
            .build(),
        task("queued", &[]),
        task("after_slow", &["slow"]),
    ];

    let report = execute(tasks, config(2).with_fail_fast(true)).await?;

    assert_eq!(report.state_of("bad"), Some(TaskState::Failed));
    assert_eq!(report.state_of("slow"), Some(TaskState::Succeeded));
    for id in ["queued", "after_slow"] {
        let t = report.task(id).ok_or("missing task")?;
        assert_eq!(t.state, TaskState::Cancelled);
        assert_eq!(t.cancel_reason, Some(CancelReason::FailFast));
    }
    assert!(!report.is_success());
    assert!(!report.was_cancelled);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelling_the_workflow_stops_running_and_waiting_tasks() -> TestResult {
    init_tracing();

    let tasks = vec![
        TaskBuilder::new("long")
            .work(ScriptedWork::succeed().with_delay(Duration::from_secs(3600)))
            .build(),
        TaskBuilder::new("stubborn")
            .work(
                ScriptedWork::succeed()
                    .with_delay(Duration::from_millis(200))
                    .ignoring_cancellation(),
            )
            .build(),
        task("after_long", &["long"]),
    ];

    let orchestrator = Orchestrator::new(tasks, config(4))?;
    let handle = orchestrator.handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let report = orchestrator.run().await?;

    assert!(report.was_cancelled);
    assert!(!report.is_success());
    for id in ["long", "after_long"] {
        let t = report.task(id).ok_or("missing task")?;
        assert_eq!(t.state, TaskState::Cancelled);
        assert_eq!(t.cancel_reason, Some(CancelReason::WorkflowCancelled));
    }
    // Ignoring the signal means it runs to completion.
    assert_eq!(report.state_of("stubborn"), Some(TaskState::Succeeded));
    Ok(())
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() -> TestResult {
    init_tracing();

    let work = ScriptedWork::succeed();
    let tasks = vec![
        TaskBuilder::new("A").work(work.clone()).build(),
        task("B", &["A"]),
    ];
    let orchestrator = Orchestrator::new(tasks, config(2))?;
    orchestrator.handle().cancel();

    let report = with_timeout(orchestrator.run()).await?;

    assert!(report.was_cancelled);
    assert_eq!(report.counts.cancelled, 2);
    assert_eq!(work.calls(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn tasks_added_at_runtime_join_the_graph() -> TestResult {
    init_tracing();

    let tasks = vec![
        TaskBuilder::new("gate")
            .work(ScriptedWork::succeed().with_delay(Duration::from_secs(1)))
            .build(),
    ];
    let orchestrator = Orchestrator::new(tasks, config(2))?;
    let handle = orchestrator.handle();

    let extender = {
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let rejected = handle.extend(vec![task("orphan", &["missing"])]).await;
            handle
                .extend(vec![task("child", &["gate"]), task("grandchild", &["child"])])
                .await?;
            Ok::<_, TaskdagError>(rejected)
        })
    };

    let report = orchestrator.run().await?;
    let rejected = extender.await??;

    assert!(matches!(
        rejected,
        Err(TaskdagError::Graph(GraphError::UnknownDependency { .. }))
    ));
    assert!(report.task("orphan").is_none());
    assert!(report.is_success());
    assert_eq!(report.tasks.len(), 3);

    let gate_end = report.task("gate").and_then(|t| t.ended_at).ok_or("gate never ended")?;
    let child_start = report.task("child").and_then(|t| t.started_at).ok_or("child never started")?;
    assert!(child_start >= gate_end);

    let late = handle.extend(vec![task("late", &[])]).await;
    assert!(matches!(late, Err(TaskdagError::RuntimeClosed)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn tasks_added_after_fail_fast_are_cancelled_at_once() -> TestResult {
    init_tracing();

    let tasks = vec![
        TaskBuilder::new("bad")
            .work(ScriptedWork::always(WorkError::permanent("boom")))
            .build(),
        TaskBuilder::new("slow")
            .work(ScriptedWork::succeed().with_delay(Duration::from_secs(1)))
            .build(),
    ];
    let orchestrator = Orchestrator::new(tasks, config(2).with_fail_fast(true))?;
    let handle = orchestrator.handle();

    let late_work = ScriptedWork::succeed();
    let extender = {
        let late_work = late_work.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle
                .extend(vec![
                    TaskBuilder::new("late").work(late_work).build(),
                    task("after_slow", &["slow"]),
                ])
                .await
        })
    };

    let report = orchestrator.run().await?;
    extender.await??;

    assert_eq!(report.state_of("bad"), Some(TaskState::Failed));
    assert_eq!(report.state_of("slow"), Some(TaskState::Succeeded));
    for id in ["late", "after_slow"] {
        let t = report.task(id).ok_or("missing task")?;
        assert_eq!(t.state, TaskState::Cancelled);
        assert_eq!(t.cancel_reason, Some(CancelReason::FailFast));
        assert_eq!(t.attempts, 0);
    }
    assert_eq!(late_work.calls(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn tasks_added_after_workflow_cancel_are_cancelled_at_once() -> TestResult {
    init_tracing();

    let tasks = vec![
        TaskBuilder::new("stubborn")
            .work(
                ScriptedWork::succeed()
                    .with_delay(Duration::from_millis(200))
                    .ignoring_cancellation(),
            )
            .build(),
    ];
    let orchestrator = Orchestrator::new(tasks, config(2))?;
    let handle = orchestrator.handle();

    let late_work = ScriptedWork::succeed();
    let extender = {
        let late_work = late_work.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle
                .extend(vec![TaskBuilder::new("late").work(late_work).build()])
                .await
        })
    };

    let report = orchestrator.run().await?;
    extender.await??;

    assert!(report.was_cancelled);
    assert_eq!(report.state_of("stubborn"), Some(TaskState::Succeeded));
    let late = report.task("late").ok_or("missing task")?;
    assert_eq!(late.state, TaskState::Cancelled);
    assert_eq!(late.cancel_reason, Some(CancelReason::WorkflowCancelled));
    assert_eq!(late_work.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn work_can_extend_its_own_workflow() -> TestResult {
    init_tracing();

    let slot: Arc<OnceLock<WorkflowHandle>> = Arc::new(OnceLock::new());
    let planner = {
        let slot = Arc::clone(&slot);
        work_fn(move |_ctx| {
            let handle = slot.get().cloned();
            async move {
                let handle = handle.ok_or_else(|| WorkError::permanent("no handle"))?;
                handle
                    .extend(vec![task("generated", &["plan"])])
                    .await
                    .map_err(|e| WorkError::permanent(e.to_string()))?;
                Ok::<_, WorkError>(serde_json::json!("planned"))
            }
        })
    };

    let orchestrator = Orchestrator::new(
        vec![TaskDescriptor::new("plan", planner)],
        config(1),
    )?;
    let _ = slot.set(orchestrator.handle());

    let report = with_timeout(orchestrator.run()).await?;
    assert!(report.is_success());
    assert_eq!(report.state_of("generated"), Some(TaskState::Succeeded));
    Ok(())
}

#[tokio::test]
async fn panicking_work_fails_its_task() -> TestResult {
    init_tracing();

    let boom = work_fn(|ctx| async move {
        if ctx.attempt() >= 1 {
            panic!("kaboom on attempt {}", ctx.attempt());
        }
        Ok(serde_json::Value::Null)
    });
    let tasks = vec![
        TaskDescriptor::new("explode", boom)
            .with_retry_policy(RetryPolicy::fixed(3, Duration::from_millis(1))),
        task("after", &["explode"]),
    ];

    let report = with_timeout(execute(tasks, config(1))).await?;

    let explode = report.task("explode").ok_or("missing task")?;
    assert_eq!(explode.state, TaskState::Failed);
    assert_eq!(explode.attempts, 1);
    assert!(explode.error.as_deref().unwrap_or_default().contains("panicked"));
    assert_eq!(report.state_of("after"), Some(TaskState::Cancelled));
    Ok(())
}

#[tokio::test]
async fn invalid_workflows_are_rejected_before_running() {
    init_tracing();

    let cycle = vec![task("a", &["b"]), task("b", &["a"])];
    assert!(matches!(
        Orchestrator::new(cycle, config(1)),
        Err(TaskdagError::Graph(GraphError::Cycle { .. }))
    ));

    let dup = vec![task("a", &[]), task("a", &[])];
    assert!(matches!(
        Orchestrator::new(dup, config(1)),
        Err(TaskdagError::Graph(GraphError::DuplicateId(_)))
    ));

    assert!(matches!(
        Orchestrator::new(diamond(), config(0)),
        Err(TaskdagError::ConfigError(_))
    ));
    assert!(matches!(
        Orchestrator::new(diamond(), config(usize::MAX)),
        Err(TaskdagError::ConfigError(_))
    ));

    let work = ScriptedWork::succeed();
    let zero_attempts = vec![
        TaskBuilder::new("a")
            .work(work.clone())
            .retry(RetryPolicy::exponential(0, Duration::from_millis(10), 2.0))
            .build(),
    ];
    assert!(matches!(
        Orchestrator::new(zero_attempts, config(1)),
        Err(TaskdagError::Graph(GraphError::InvalidRetryPolicy { task, .. })) if task == "a"
    ));

    let shrinking = vec![
        task("a", &[]),
        TaskBuilder::new("b")
            .after("a")
            .retry(RetryPolicy::exponential(3, Duration::from_millis(10), 0.5))
            .build(),
    ];
    assert!(matches!(
        execute(shrinking, config(1)).await,
        Err(TaskdagError::Graph(GraphError::InvalidRetryPolicy { task, .. })) if task == "b"
    ));
    assert_eq!(work.calls(), 0);
}

#[tokio::test]
async fn fake_executor_sees_dispatch_order_and_failures() -> TestResult {
    init_tracing();

    let tasks = vec![task("A", &[]), task("B", &["A"]), task("C", &["B"])];
    let executed = Arc::new(Mutex::new(Vec::new()));

    let report = with_timeout(
        Orchestrator::new(tasks, config(1))?.run_with_executor(|tx| {
            FakeExecutor::new(tx, Arc::clone(&executed)).failing(["B"])
        }),
    )
    .await?;

    let got = executed.lock().unwrap().clone();
    assert_eq!(got, vec![("A".to_string(), 1), ("B".to_string(), 1)]);
    assert_eq!(report.state_of("C"), Some(TaskState::Cancelled));
    Ok(())
}

#[tokio::test]
async fn fake_executor_handles_a_batch_wider_than_the_event_channel() -> TestResult {
    init_tracing();

    let tasks: Vec<TaskDescriptor> = (0..200).map(|i| task(&format!("t{i:03}"), &[])).collect();
    let executed = Arc::new(Mutex::new(Vec::new()));

    let report = with_timeout(
        Orchestrator::new(tasks, config(256))?
            .run_with_executor(|tx| FakeExecutor::new(tx, Arc::clone(&executed))),
    )
    .await?;

    assert!(report.is_success());
    assert_eq!(report.counts.succeeded, 200);
    assert_eq!(executed.lock().unwrap().len(), 200);
    Ok(())
}

#[test]
fn report_from_the_same_records_is_identical() {
    let mut scheduler = Scheduler::new(diamond(), &OrchestratorConfig::default()).unwrap();
    scheduler.seed();
    while !scheduler.is_finished() {
        let (next, _) = scheduler.next_ready().unwrap();
        let outcome = if next.id == "C" {
            AttemptOutcome::Failed(WorkError::permanent("nope").into())
        } else {
            AttemptOutcome::Succeeded(serde_json::Value::Null)
        };
        scheduler.step_completion(&next.id, next.attempt, outcome);
    }

    let records = scheduler.records();
    let first = Report::from_records(&records, false);
    let second = Report::from_records(&records, false);
    assert_eq!(first, second);
    assert_eq!(first.counts.total(), 4);
    assert_eq!(first.state_of("D"), Some(TaskState::Cancelled));
    assert_eq!(
        first.first_fatal_error.as_ref().map(|f| f.task.as_str()),
        Some("C")
    );
}
