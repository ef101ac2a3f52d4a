// src/report.rs

//! Result aggregation and the workflow report.
//!
//! [`Report::from_records`] is a pure function of the execution records:
//! the same records always give the same report. Wall time is derived
//! from the records too (earliest start to latest end), not from a clock.
//!
//! [`ResultAggregator`] collects task summaries as tasks reach a terminal
//! state and builds the report once the runtime loop ends.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::time::Instant;

use crate::dag::TaskRecord;
use crate::task::WorkOutput;
use crate::types::{CancelReason, TaskId, TaskState};

fn millis(d: &Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(millis(d))
}

fn as_opt_millis<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&millis(d)),
        None => s.serialize_none(),
    }
}

/// Final (or latest) state of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub state: TaskState,
    pub attempts: u32,
    pub stage: usize,
    pub registration: usize,
    #[serde(skip)]
    pub started_at: Option<Instant>,
    #[serde(skip)]
    pub ended_at: Option<Instant>,
    #[serde(rename = "duration_ms", serialize_with = "as_opt_millis")]
    pub duration: Option<Duration>,
    pub error: Option<String>,
    pub cancel_reason: Option<CancelReason>,
    pub output: Option<WorkOutput>,
}

impl From<&TaskRecord> for TaskSummary {
    fn from(record: &TaskRecord) -> Self {
        Self {
            id: record.id().to_string(),
            state: record.state(),
            attempts: record.attempt_count(),
            stage: record.stage(),
            registration: record.registration(),
            started_at: record.first_started_at(),
            ended_at: record.ended_at(),
            duration: record.duration(),
            error: record.last_error().map(|e| e.to_string()),
            cancel_reason: record.cancel_reason().cloned(),
            output: record.output().cloned(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Tasks that never reached a terminal state.
    pub incomplete: usize,
}

impl StateCounts {
    fn add(&mut self, state: TaskState) {
        match state {
            TaskState::Succeeded => self.succeeded += 1,
            TaskState::Failed => self.failed += 1,
            TaskState::Cancelled => self.cancelled += 1,
            TaskState::Pending | TaskState::Ready | TaskState::Running => self.incomplete += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled + self.incomplete
    }
}

/// Breakdown for all tasks at one topological depth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    pub stage: usize,
    pub counts: StateCounts,
    /// Earliest start to latest end among the stage's tasks that ran.
    #[serde(rename = "wall_time_ms", serialize_with = "as_millis")]
    pub wall_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FatalError {
    pub task: TaskId,
    pub error: String,
}

/// Workflow summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Per-task summaries in registration order.
    pub tasks: Vec<TaskSummary>,
    pub counts: StateCounts,
    #[serde(rename = "wall_time_ms", serialize_with = "as_millis")]
    pub wall_time: Duration,
    pub stages: Vec<StageSummary>,
    /// Error of the task that failed first.
    pub first_fatal_error: Option<FatalError>,
    pub was_cancelled: bool,
}

impl Report {
    pub fn from_records(records: &[TaskRecord], was_cancelled: bool) -> Self {
        Self::from_summaries(records.iter().map(TaskSummary::from).collect(), was_cancelled)
    }

    pub fn from_summaries(mut tasks: Vec<TaskSummary>, was_cancelled: bool) -> Self {
        tasks.sort_by_key(|t| t.registration);

        let mut counts = StateCounts::default();
        let mut by_stage: BTreeMap<usize, Vec<&TaskSummary>> = BTreeMap::new();
        for task in tasks.iter() {
            counts.add(task.state);
            by_stage.entry(task.stage).or_default().push(task);
        }

        let stages = by_stage
            .into_iter()
            .map(|(stage, members)| {
                let mut counts = StateCounts::default();
                for t in members.iter() {
                    counts.add(t.state);
                }
                StageSummary {
                    stage,
                    counts,
                    wall_time: span(members.iter().copied()),
                }
            })
            .collect();

        let first_fatal_error = tasks
            .iter()
            .filter(|t| t.state == TaskState::Failed)
            .min_by_key(|t| (t.ended_at, t.registration))
            .map(|t| FatalError {
                task: t.id.clone(),
                error: t.error.clone().unwrap_or_default(),
            });

        Self {
            wall_time: span(tasks.iter()),
            tasks,
            counts,
            stages,
            first_fatal_error,
            was_cancelled,
        }
    }

    /// Every task succeeded.
    pub fn is_success(&self) -> bool {
        !self.was_cancelled && self.counts.succeeded == self.counts.total()
    }

    pub fn task(&self, id: &str) -> Option<&TaskSummary> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.task(id).map(|t| t.state)
    }

    pub fn output(&self, id: &str) -> Option<&WorkOutput> {
        self.task(id).and_then(|t| t.output.as_ref())
    }
}

fn span<'a>(tasks: impl Iterator<Item = &'a TaskSummary>) -> Duration {
    let mut start: Option<Instant> = None;
    let mut end: Option<Instant> = None;
    for t in tasks {
        if let Some(s) = t.started_at {
            start = Some(start.map_or(s, |cur| cur.min(s)));
        }
        if let Some(e) = t.ended_at {
            end = Some(end.map_or(e, |cur| cur.max(e)));
        }
    }
    match (start, end) {
        (Some(s), Some(e)) => e.saturating_duration_since(s),
        _ => Duration::ZERO,
    }
}

/// Collects task summaries as tasks finish.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    /// Keyed by registration index; a later summary for the same task
    /// replaces the earlier one.
    summaries: BTreeMap<usize, TaskSummary>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, summary: TaskSummary) {
        self.summaries.insert(summary.registration, summary);
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn finish(self, was_cancelled: bool) -> Report {
        Report::from_summaries(self.summaries.into_values().collect(), was_cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, reg: usize, stage: usize, state: TaskState, start_ms: u64, end_ms: u64) -> TaskSummary {
        let base = Instant::now();
        TaskSummary {
            id: id.to_string(),
            state,
            attempts: 1,
            stage,
            registration: reg,
            started_at: Some(base + Duration::from_millis(start_ms)),
            ended_at: Some(base + Duration::from_millis(end_ms)),
            duration: Some(Duration::from_millis(end_ms - start_ms)),
            error: (state == TaskState::Failed).then(|| format!("{id} broke")),
            cancel_reason: None,
            output: None,
        }
    }

    #[test]
    fn counts_stages_and_first_failure() {
        let tasks = vec![
            summary("c", 2, 1, TaskState::Failed, 30, 50),
            summary("a", 0, 0, TaskState::Succeeded, 0, 10),
            summary("b", 1, 1, TaskState::Failed, 10, 40),
            summary("d", 3, 2, TaskState::Cancelled, 0, 0),
        ];
        let report = Report::from_summaries(tasks, false);

        let ids: Vec<&str> = report.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
        assert_eq!(
            report.counts,
            StateCounts {
                succeeded: 1,
                failed: 2,
                cancelled: 1,
                incomplete: 0
            }
        );
        assert_eq!(report.stages.len(), 3);
        assert_eq!(report.stages[1].counts.failed, 2);
        assert_eq!(report.first_fatal_error.as_ref().unwrap().task, "b");
        assert!(!report.is_success());
    }

    #[test]
    fn serializes_durations_as_millis() {
        let report = Report::from_summaries(vec![summary("a", 0, 0, TaskState::Succeeded, 0, 25)], false);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["tasks"][0]["duration_ms"], 25);
        assert_eq!(value["tasks"][0]["state"], "succeeded");
        assert!(value["tasks"][0].get("started_at").is_none());
        assert!(report.is_success());
    }

    #[test]
    fn aggregator_keeps_latest_summary_per_task() {
        let mut agg = ResultAggregator::new();
        agg.record(summary("a", 0, 0, TaskState::Failed, 0, 5));
        agg.record(summary("a", 0, 0, TaskState::Succeeded, 0, 9));
        assert_eq!(agg.len(), 1);
        let report = agg.finish(true);
        assert_eq!(report.state_of("a"), Some(TaskState::Succeeded));
        assert!(report.was_cancelled);
        assert!(!report.is_success());
    }
}
