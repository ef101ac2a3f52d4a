use std::collections::HashMap;
use std::time::Duration;

use proptest::prelude::*;
use taskdag::OrchestratorConfig;
use taskdag::dag::{AttemptOutcome, Scheduler};
use taskdag::task::{RetryPolicy, WorkError};
use taskdag::types::TaskState;
use taskdag_test_utils::builders::TaskBuilder;

/// How a generated task behaves: its dependencies (by index), how many of
/// its attempts fail with a retryable error, and its attempt budget.
#[derive(Debug, Clone)]
struct TaskPlan {
    deps: Vec<usize>,
    failures: u32,
    max_attempts: u32,
}

// Acyclic by construction: task N may only depend on tasks 0..N-1.
fn plan_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<TaskPlan>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            (
                proptest::collection::vec(any::<usize>(), 0..3),
                0u32..3,
                1u32..=3,
            ),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (potential_deps, failures, max_attempts))| {
                    let mut deps: Vec<usize> = if i == 0 {
                        Vec::new()
                    } else {
                        potential_deps.into_iter().map(|d| d % i).collect()
                    };
                    deps.sort_unstable();
                    deps.dedup();
                    TaskPlan {
                        deps,
                        failures,
                        max_attempts,
                    }
                })
                .collect()
        })
    })
}

fn name(i: usize) -> String {
    format!("task_{i}")
}

fn build_scheduler(plan: &[TaskPlan]) -> Scheduler {
    let tasks = plan
        .iter()
        .enumerate()
        .map(|(i, p)| {
            p.deps
                .iter()
                .fold(TaskBuilder::new(&name(i)), |b, d| b.after(&name(*d)))
                .retry(RetryPolicy::fixed(p.max_attempts, Duration::ZERO))
                .build()
        })
        .collect();
    Scheduler::new(tasks, &OrchestratorConfig::default()).unwrap()
}

proptest! {
    #[test]
    fn scheduler_terminates_and_respects_dependencies(
        plan in plan_strategy(12),
        picks in proptest::collection::vec(any::<usize>(), 64),
    ) {
        let mut scheduler = build_scheduler(&plan);
        scheduler.seed();

        // Attempts in flight, and tasks waiting for their retry timer.
        let mut executing: Vec<(String, u32)> = Vec::new();
        let mut backoff: Vec<String> = Vec::new();
        let mut failures_left: HashMap<String, u32> = plan
            .iter()
            .enumerate()
            .map(|(i, p)| (name(i), p.failures))
            .collect();

        let mut steps = 0;
        let max_steps = 1000;

        while !scheduler.is_finished() && steps < max_steps {
            steps += 1;

            while let Some((task, transition)) = scheduler.next_ready() {
                prop_assert_eq!(transition.to, TaskState::Running);
                for dep in scheduler.graph().dependencies_of(&task.id) {
                    prop_assert_eq!(
                        scheduler.state_of(dep),
                        Some(TaskState::Succeeded),
                        "{} dispatched before {} succeeded", task.id, dep
                    );
                }
                executing.push((task.id, task.attempt));
            }

            let pending = executing.len() + backoff.len();
            prop_assert!(pending > 0, "scheduler stalled with nothing in flight");

            let pick = picks[steps % picks.len()] % pending;
            if pick < executing.len() {
                let (id, attempt) = executing.swap_remove(pick);
                let left = failures_left.get_mut(&id).unwrap();
                let outcome = if *left > 0 {
                    *left -= 1;
                    AttemptOutcome::Failed(WorkError::retryable("scripted").into())
                } else {
                    AttemptOutcome::Succeeded(serde_json::Value::Null)
                };
                let step = scheduler.step_completion(&id, attempt, outcome);
                if let Some(retry) = step.retry {
                    prop_assert_eq!(retry.next_attempt, attempt + 1);
                    backoff.push(retry.task);
                }
            } else {
                let id = backoff.swap_remove(pick - executing.len());
                scheduler.step_retry_due(&id);
            }
        }

        prop_assert!(scheduler.is_finished(), "did not terminate within {} steps", max_steps);

        for (i, p) in plan.iter().enumerate() {
            let record = scheduler.record(&name(i)).unwrap();
            let deps_ok = p
                .deps
                .iter()
                .all(|d| scheduler.state_of(&name(*d)) == Some(TaskState::Succeeded));

            let (expected, attempts) = if !deps_ok {
                (TaskState::Cancelled, 0)
            } else if p.failures < p.max_attempts {
                (TaskState::Succeeded, p.failures + 1)
            } else {
                (TaskState::Failed, p.max_attempts)
            };
            prop_assert_eq!(record.state(), expected, "final state of {}", name(i));
            prop_assert_eq!(record.attempt_count(), attempts, "attempts of {}", name(i));
        }
    }
}
