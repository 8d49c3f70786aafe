//! Crate-wide defaults, passed explicitly at construction.
//!
//! Nothing here is read implicitly: callers load a [`TaskflowConfig`] (from
//! a JSON file, a string, or `Default`) and hand it to the pieces that need
//! it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::TaskflowError;
use crate::pipeline::{EngineConfig, ExecutionMode, RetryPolicy};
use crate::store::{InMemoryRunStore, JsonFileRunStore, RunStore};

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    60
}

fn default_history_limit() -> usize {
    10
}

fn default_scheduler_tick_secs() -> u64 {
    60
}

/// Configuration for engines, stores and the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskflowConfig {
    /// Attempts per task when a task does not set its own policy.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    /// Seconds between attempts when a task does not set its own policy.
    #[serde(default = "default_retry_backoff_secs")]
    pub default_retry_backoff_secs: u64,

    /// Upper bound on any retry sleep, in seconds.
    #[serde(default)]
    pub max_backoff_secs: Option<u64>,

    /// How ready tasks are scheduled.
    #[serde(default)]
    pub execution: ExecutionMode,

    /// Default number of runs returned by history queries.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Directory for the durable run store. In-memory when unset.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,

    /// How often the scheduler loop checks triggers, in seconds.
    #[serde(default = "default_scheduler_tick_secs")]
    pub scheduler_tick_secs: u64,
}

impl Default for TaskflowConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: default_max_attempts(),
            default_retry_backoff_secs: default_retry_backoff_secs(),
            max_backoff_secs: None,
            execution: ExecutionMode::default(),
            history_limit: default_history_limit(),
            store_dir: None,
            scheduler_tick_secs: default_scheduler_tick_secs(),
        }
    }
}

impl TaskflowConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::Config`] if the file cannot be read, is not
    /// valid JSON, or holds invalid values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TaskflowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TaskflowError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Self::from_json_str(&content)
    }

    /// Parses and validates a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::Config`] on malformed JSON or invalid values.
    pub fn from_json_str(content: &str) -> Result<Self, TaskflowError> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| TaskflowError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::Config`] naming the first bad value.
    pub fn validate(&self) -> Result<(), TaskflowError> {
        if self.default_max_attempts == 0 {
            return Err(TaskflowError::Config(
                "default_max_attempts must be at least 1".into(),
            ));
        }
        if self.scheduler_tick_secs == 0 {
            return Err(TaskflowError::Config(
                "scheduler_tick_secs must be at least 1".into(),
            ));
        }
        if let ExecutionMode::Parallel { max_concurrency: 0 } = self.execution {
            return Err(TaskflowError::Config(
                "parallel max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Sets the default attempts per task.
    #[must_use]
    pub fn with_default_max_attempts(mut self, attempts: u32) -> Self {
        self.default_max_attempts = attempts;
        self
    }

    /// Sets the default delay between attempts.
    #[must_use]
    pub fn with_default_retry_backoff(mut self, backoff: Duration) -> Self {
        self.default_retry_backoff_secs = backoff.as_secs();
        self
    }

    /// Caps every retry sleep.
    #[must_use]
    pub fn with_max_backoff(mut self, cap: Duration) -> Self {
        self.max_backoff_secs = Some(cap.as_secs());
        self
    }

    /// Sets the execution mode.
    #[must_use]
    pub fn with_execution(mut self, mode: ExecutionMode) -> Self {
        self.execution = mode;
        self
    }

    /// Sets the durable store directory.
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// Retry policy for tasks that do not set their own.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.default_max_attempts)
            .with_backoff(Duration::from_secs(self.default_retry_backoff_secs))
    }

    /// Engine configuration derived from these settings.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let config = EngineConfig::new()
            .with_mode(self.execution)
            .with_default_retry(self.retry_policy());
        match self.max_backoff_secs {
            Some(secs) => config.with_max_backoff(Duration::from_secs(secs)),
            None => config,
        }
    }

    /// The run store these settings select.
    #[must_use]
    pub fn run_store(&self) -> Arc<dyn RunStore> {
        match &self.store_dir {
            Some(dir) => Arc::new(JsonFileRunStore::new(dir.clone())),
            None => Arc::new(InMemoryRunStore::new()),
        }
    }

    /// Scheduler polling interval.
    #[must_use]
    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_secs)
    }
}
