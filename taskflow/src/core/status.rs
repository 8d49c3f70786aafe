//! Task and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has not been considered yet.
    #[default]
    Pending,
    /// Task body is being invoked (possibly on a retry).
    Running,
    /// Task completed successfully.
    Success,
    /// Task failed after exhausting its attempts.
    Failed,
    /// Task never ran because a dependency did not succeed.
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl TaskStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }

    /// Returns true if the status passes a dependency gate.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the status counts against the run.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// The aggregated outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No task failed.
    Success,
    /// At least one task failed.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl RunStatus {
    /// Aggregates task statuses: success iff none of them failed.
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a TaskStatus>) -> Self {
        if statuses.into_iter().any(TaskStatus::is_failure) {
            Self::Failed
        } else {
            Self::Success
        }
    }
}
