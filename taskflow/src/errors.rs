//! Error types for the taskflow engine.
//!
//! Configuration problems (malformed graphs, bad triggers) and store failures
//! are surfaced as errors. Task body failures are not: they are retried and
//! recorded on the run record instead.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for taskflow operations.
#[derive(Debug, Error)]
pub enum TaskflowError {
    /// The pipeline graph is malformed.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The run store failed to record or read a run.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// No pipeline is registered under the given id.
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    /// A trigger expression could not be parsed.
    #[error("Invalid trigger '{expression}': {reason}")]
    InvalidTrigger {
        /// The rejected expression.
        expression: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Metadata about a configuration error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline definition is malformed.
///
/// This is the configuration error of the engine: duplicate task ids,
/// dependencies on unknown tasks, cycles. It is always
/// raised before any task body runs.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The tasks involved in the error.
    pub tasks: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tasks: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the tasks involved.
    #[must_use]
    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the pipeline graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of tasks forming the cycle, first task repeated at the end.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CONTRACT-004-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            tasks: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Error raised when writing to an existing key in the run context.
#[derive(Debug, Clone, Error)]
#[error("Data conflict: key '{key}' already exists")]
pub struct DataConflictError {
    /// The conflicting key.
    pub key: String,
}

impl DataConflictError {
    /// Creates a new data conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// A single failed invocation of a task body.
///
/// Never returned from a run. The engine keeps its text on the task's
/// execution record and retries or marks the task failed.
#[derive(Debug, Clone, Error)]
#[error("Task '{task_id}' attempt {attempt} failed: {message}")]
pub struct TaskExecutionError {
    /// The failing task.
    pub task_id: String,
    /// 1-indexed attempt number.
    pub attempt: u32,
    /// The body's error text.
    pub message: String,
}

impl TaskExecutionError {
    /// Creates a task execution error from a body failure.
    #[must_use]
    pub fn new(task_id: impl Into<String>, attempt: u32, source: &anyhow::Error) -> Self {
        Self {
            task_id: task_id.into(),
            attempt,
            message: format!("{source:#}"),
        }
    }
}

/// Errors raised by run stores.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// An I/O operation against durable storage failed.
    #[error("Run store I/O error at '{path}': {source}")]
    Io {
        /// The file or directory involved.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded.
    #[error("Run record serialization error for '{run_id}': {message}")]
    Serialization {
        /// The run id, or the file name when the id is unknown.
        run_id: String,
        /// The serializer message.
        message: String,
    },

    /// The backend refused or lost the write.
    #[error("Run store unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    /// Wraps an I/O error with the path it happened on.
    #[must_use]
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
