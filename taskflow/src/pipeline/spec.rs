//! Task specifications.

use super::RetryPolicy;
use crate::errors::{ContractErrorInfo, CycleDetectedError, PipelineValidationError};
use crate::tasks::{TaskArgs, TaskBody};
use std::sync::Arc;
use std::time::Duration;

/// Immutable definition of a single task in a pipeline.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// The unique id of the task.
    pub id: String,
    /// The task body.
    pub body: Arc<dyn TaskBody>,
    /// Static arguments passed on every invocation.
    pub args: TaskArgs,
    /// Ids of tasks that must succeed before this one runs, in declaration
    /// order and without repeats.
    pub dependencies: Vec<String>,
    /// Retry policy. When unset the engine's default policy applies.
    pub retry: Option<RetryPolicy>,
}

impl TaskSpec {
    /// Creates a new task specification that uses the engine's retry policy.
    #[must_use]
    pub fn new(id: impl Into<String>, body: Arc<dyn TaskBody>) -> Self {
        Self {
            id: id.into(),
            body,
            args: TaskArgs::default(),
            dependencies: Vec::new(),
            retry: None,
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies.clear();
        for dep in deps {
            self = self.with_dependency(dep);
        }
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// Sets the static arguments.
    #[must_use]
    pub fn with_args(mut self, args: TaskArgs) -> Self {
        self.args = args;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the maximum number of attempts.
    ///
    /// Starts from [`RetryPolicy::default`] if no policy was set yet.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry = Some(self.retry.unwrap_or_default().with_max_attempts(attempts));
        self
    }

    /// Sets the delay between attempts.
    ///
    /// Starts from [`RetryPolicy::default`] if no policy was set yet.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry = Some(self.retry.unwrap_or_default().with_backoff(backoff));
        self
    }

    /// The policy this task runs with, given the engine's default.
    #[must_use]
    pub fn retry_policy<'a>(&'a self, fallback: &'a RetryPolicy) -> &'a RetryPolicy {
        self.retry.as_ref().unwrap_or(fallback)
    }

    /// Validates the task specification on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is blank, the task depends on itself, or
    /// its retry policy allows no attempts.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.id.trim().is_empty() {
            return Err(PipelineValidationError::new("Task id cannot be empty or whitespace-only")
                .with_error_info(ContractErrorInfo::new(
                    "CONTRACT-004-EMPTY_ID",
                    "Task ids must be non-empty",
                )));
        }
        if self.dependencies.contains(&self.id) {
            return Err(CycleDetectedError::new(vec![self.id.clone(), self.id.clone()]).into());
        }
        match &self.retry {
            Some(retry) => retry.validate(&self.id),
            None => Ok(()),
        }
    }
}
