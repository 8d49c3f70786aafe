//! Tracing subscriber setup.
//!
//! The library only emits `tracing` spans and events; installing a
//! subscriber is left to the application. [`init_tracing`] is a convenience
//! for binaries and examples that want the usual fmt output.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::errors::TaskflowError;

fn default_filter() -> String {
    "info".to_string()
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `taskflow=debug`).
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit one JSON object per line instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl TracingConfig {
    /// Sets the fallback filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Switches JSON output on or off.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, TaskflowError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.filter).map_err(|e| {
                TaskflowError::Config(format!("invalid log filter '{}': {e}", self.filter))
            }),
        }
    }
}

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.
///
/// # Errors
///
/// Returns [`TaskflowError::Config`] if the filter does not parse or a
/// global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TaskflowError> {
    let filter = config.env_filter()?;
    let json = config.json.then(|| fmt::layer().json());
    let text = (!config.json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init()
        .map_err(|e| TaskflowError::Config(format!("failed to install tracing subscriber: {e}")))
}
