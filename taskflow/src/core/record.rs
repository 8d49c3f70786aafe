//! Run records: the persisted snapshot of one pipeline execution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{RunStatus, TaskExecution, TaskStatus};
use crate::utils::{generate_run_id, Timestamp};

/// Snapshot of one execution of a pipeline.
///
/// The engine owns the record while the run is in progress and hands it back
/// frozen (with `end_time` set and `overall_status` computed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique id, derived from the pipeline id and start time.
    pub run_id: String,
    /// The pipeline that ran.
    pub pipeline_id: String,
    /// When the run started.
    pub start_time: Timestamp,
    /// When the last task reached a terminal status.
    pub end_time: Option<Timestamp>,
    /// Aggregated status.
    pub overall_status: RunStatus,
    /// Per-task outcome, keyed by task id.
    pub executions: BTreeMap<String, TaskExecution>,
}

/// Counts of task outcomes in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of tasks in the run.
    pub total: usize,
    /// Tasks that succeeded.
    pub succeeded: usize,
    /// Tasks that failed.
    pub failed: usize,
    /// Tasks that were skipped.
    pub skipped: usize,
}

impl RunRecord {
    /// Opens a record with every task pending.
    #[must_use]
    pub fn open<I, S>(pipeline_id: &str, start_time: Timestamp, task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            run_id: generate_run_id(pipeline_id, &start_time),
            pipeline_id: pipeline_id.to_string(),
            start_time,
            end_time: None,
            // Recomputed by `finalize`.
            overall_status: RunStatus::Success,
            executions: task_ids
                .into_iter()
                .map(|id| (id.into(), TaskExecution::new()))
                .collect(),
        }
    }

    /// Freezes the record: sets `end_time` and aggregates the status.
    pub fn finalize(&mut self, end_time: Timestamp) {
        self.end_time = Some(end_time);
        self.overall_status =
            RunStatus::from_statuses(self.executions.values().map(|e| &e.status));
    }

    /// Returns true once `finalize` has run.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    /// Returns true if the run succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.overall_status == RunStatus::Success
    }

    /// Returns the execution for a task.
    #[must_use]
    pub fn execution(&self, task_id: &str) -> Option<&TaskExecution> {
        self.executions.get(task_id)
    }

    /// Returns the status of a task.
    #[must_use]
    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.executions.get(task_id).map(|e| e.status)
    }

    pub(crate) fn execution_mut(&mut self, task_id: &str) -> Option<&mut TaskExecution> {
        self.executions.get_mut(task_id)
    }

    /// Ids of failed tasks, sorted.
    #[must_use]
    pub fn failed_tasks(&self) -> Vec<&str> {
        self.tasks_with(TaskStatus::Failed)
    }

    /// Ids of skipped tasks, sorted.
    #[must_use]
    pub fn skipped_tasks(&self) -> Vec<&str> {
        self.tasks_with(TaskStatus::Skipped)
    }

    fn tasks_with(&self, status: TaskStatus) -> Vec<&str> {
        self.executions
            .iter()
            .filter(|(_, e)| e.status == status)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Wall-clock duration of the run, once finalized.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Counts task outcomes.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.executions.len(),
            ..RunSummary::default()
        };
        for exec in self.executions.values() {
            match exec.status {
                TaskStatus::Success => summary.succeeded += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Pending | TaskStatus::Running => {}
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::now_utc;
    use pretty_assertions::assert_eq;

    fn sample_record() -> RunRecord {
        let mut record = RunRecord::open("daily", now_utc(), ["fetch", "metrics", "alerts"]);

        let fetch = record.execution_mut("fetch").unwrap();
        fetch.start(now_utc());
        fetch.begin_attempt();
        fetch.succeed(serde_json::json!(["AAPL"]), now_utc());

        let metrics = record.execution_mut("metrics").unwrap();
        metrics.start(now_utc());
        metrics.begin_attempt();
        metrics.record_attempt_error("division by zero");
        metrics.fail(now_utc());

        record
            .execution_mut("alerts")
            .unwrap()
            .skip("dependency 'metrics' failed", now_utc());

        record.finalize(now_utc());
        record
    }

    #[test]
    fn test_open_record_is_pending() {
        let record = RunRecord::open("daily", now_utc(), ["a", "b"]);
        assert!(record.run_id.starts_with("daily_"));
        assert!(!record.is_finalized());
        assert_eq!(record.status_of("a"), Some(TaskStatus::Pending));
        assert_eq!(record.status_of("b"), Some(TaskStatus::Pending));
    }

    #[test]
    fn test_finalize_aggregates_failure() {
        let record = sample_record();
        assert!(record.is_finalized());
        assert!(!record.succeeded());
        assert_eq!(record.failed_tasks(), vec!["metrics"]);
        assert_eq!(record.skipped_tasks(), vec!["alerts"]);
    }

    #[test]
    fn test_skipped_only_run_succeeds() {
        let mut record = RunRecord::open("p", now_utc(), ["a"]);
        record.execution_mut("a").unwrap().skip("cancelled: shutdown", now_utc());
        record.finalize(now_utc());
        assert_eq!(record.overall_status, RunStatus::Success);
    }

    #[test]
    fn test_summary_counts() {
        let summary = sample_record().summary();
        assert_eq!(
            summary,
            RunSummary {
                total: 3,
                succeeded: 1,
                failed: 1,
                skipped: 1,
            }
        );
    }

    #[test]
    fn test_json_round_trip() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let restored: RunRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, record);
    }
}
