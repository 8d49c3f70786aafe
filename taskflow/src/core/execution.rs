//! Per-run mutable state of a single task.

use serde::{Deserialize, Serialize};

use super::TaskStatus;
use crate::utils::Timestamp;

/// The outcome of executing one task during one run.
///
/// Task definitions are never mutated by a run; every run gets fresh
/// `TaskExecution` values, so a pipeline can be run repeatedly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    /// Current status.
    pub status: TaskStatus,
    /// Number of body invocations made so far.
    pub attempt_count: u32,
    /// Payload of the successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Text of the last failed attempt. Cleared when a later attempt
    /// succeeds.
    #[serde(default)]
    pub error: Option<String>,
    /// Why the task was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// When the first attempt started.
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    /// When the task reached a terminal status.
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
}

impl TaskExecution {
    /// Creates a pending execution.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a pending execution to running.
    pub fn start(&mut self, at: Timestamp) {
        debug_assert_eq!(self.status, TaskStatus::Pending);
        self.status = TaskStatus::Running;
        self.started_at = Some(at);
    }

    /// Counts a new attempt and returns its 1-indexed number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }

    /// Records the error of a failed attempt without leaving `Running`.
    pub fn record_attempt_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    /// Marks the execution successful.
    pub fn succeed(&mut self, result: serde_json::Value, at: Timestamp) {
        self.status = TaskStatus::Success;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(at);
    }

    /// Marks the execution failed, keeping the last attempt's error.
    pub fn fail(&mut self, at: Timestamp) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(at);
    }

    /// Marks a non-terminal execution skipped.
    ///
    /// Attempts already made, and their last error, stay on the record.
    pub fn skip(&mut self, reason: impl Into<String>, at: Timestamp) {
        debug_assert!(!self.status.is_terminal());
        self.status = TaskStatus::Skipped;
        self.skip_reason = Some(reason.into());
        self.completed_at = Some(at);
    }
}
