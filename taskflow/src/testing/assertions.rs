//! Test assertions for run records.

use crate::core::{RunRecord, RunStatus, TaskStatus};

/// Asserts that a task ended with the expected status.
pub fn assert_task_status(record: &RunRecord, task_id: &str, expected: TaskStatus) {
    let actual = record.status_of(task_id);
    assert_eq!(
        actual,
        Some(expected),
        "Expected task '{task_id}' to be {expected}, got {actual:?}"
    );
}

/// Asserts that a task succeeded.
pub fn assert_task_succeeded(record: &RunRecord, task_id: &str) {
    assert_task_status(record, task_id, TaskStatus::Success);
}

/// Asserts that a task failed.
pub fn assert_task_failed(record: &RunRecord, task_id: &str) {
    assert_task_status(record, task_id, TaskStatus::Failed);
}

/// Asserts that a task was skipped and never invoked.
pub fn assert_task_skipped(record: &RunRecord, task_id: &str) {
    assert_task_status(record, task_id, TaskStatus::Skipped);
    let attempts = record.execution(task_id).map_or(0, |e| e.attempt_count);
    assert_eq!(
        attempts, 0,
        "Skipped task '{task_id}' should have no attempts, got {attempts}"
    );
}

/// Asserts the number of attempts a task made.
pub fn assert_attempts(record: &RunRecord, task_id: &str, expected: u32) {
    let attempts = record.execution(task_id).map(|e| e.attempt_count);
    assert_eq!(
        attempts,
        Some(expected),
        "Expected {expected} attempts for task '{task_id}', got {attempts:?}"
    );
}

/// Asserts that the run succeeded.
pub fn assert_run_succeeded(record: &RunRecord) {
    assert_eq!(
        record.overall_status,
        RunStatus::Success,
        "Expected run '{}' to succeed; failed tasks: {:?}",
        record.run_id,
        record.failed_tasks()
    );
}

/// Asserts that the run failed.
pub fn assert_run_failed(record: &RunRecord) {
    assert_eq!(
        record.overall_status,
        RunStatus::Failed,
        "Expected run '{}' to fail",
        record.run_id
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::now_utc;

    fn record() -> RunRecord {
        let now = now_utc();
        let mut record = RunRecord::open("p", now, ["ok", "bad", "never"]);
        if let Some(e) = record.execution_mut("ok") {
            e.start(now);
            e.begin_attempt();
            e.succeed(serde_json::json!(1), now);
        }
        if let Some(e) = record.execution_mut("bad") {
            e.start(now);
            e.begin_attempt();
            e.record_attempt_error("boom");
            e.fail(now);
        }
        if let Some(e) = record.execution_mut("never") {
            e.skip("dependency 'bad' is failed", now);
        }
        record.finalize(now);
        record
    }

    #[test]
    fn test_assertions_pass() {
        let record = record();
        assert_task_succeeded(&record, "ok");
        assert_task_failed(&record, "bad");
        assert_task_skipped(&record, "never");
        assert_attempts(&record, "bad", 1);
        assert_run_failed(&record);
    }

    #[test]
    #[should_panic(expected = "Expected task 'ok' to be failed")]
    fn test_status_mismatch_panics() {
        assert_task_failed(&record(), "ok");
    }
}
