//! Per-task retry policy with configurable backoff and jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{ContractErrorInfo, PipelineValidationError};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base (constant)
    #[default]
    Constant,
    /// delay = base * failures
    Linear,
    /// delay = base * 2^(failures - 1)
    Exponential,
}

/// Jitter strategy to spread out retries of many tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    60_000
}

fn default_max_backoff_ms() -> u64 {
    3_600_000
}

/// How often and how patiently a task is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first one. Must be at least 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub strategy: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            strategy: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default 3 attempts, 60s apart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt, no retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the base delay.
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Checks that the policy allows at least one attempt.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `max_attempts` is zero.
    pub fn validate(&self, task_id: &str) -> Result<(), PipelineValidationError> {
        if self.max_attempts == 0 {
            return Err(PipelineValidationError::new(format!(
                "Task '{task_id}' must allow at least one attempt"
            ))
            .with_tasks(vec![task_id.to_string()])
            .with_error_info(
                ContractErrorInfo::new("CONTRACT-004-RETRY", "max_attempts must be positive")
                    .with_fix_hint("Use RetryPolicy::no_retry() for a single attempt."),
            ));
        }
        Ok(())
    }

    /// Returns true if another attempt may follow `failures` failed ones.
    #[must_use]
    pub const fn allows_retry_after(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }

    /// Calculates the delay to wait after the `failures`-th failed attempt.
    #[must_use]
    pub fn delay_after(&self, failures: u32) -> Duration {
        let base = self.backoff_ms;
        let max = self.max_backoff_ms;
        let n = u64::from(failures.max(1));

        let delay = match self.strategy {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(n),
            BackoffStrategy::Exponential => {
                let factor = 2u64.saturating_pow(u32::try_from(n - 1).unwrap_or(u32::MAX));
                base.saturating_mul(factor)
            }
        }
        .min(max);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}
