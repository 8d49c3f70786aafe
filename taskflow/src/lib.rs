//! # Taskflow
//!
//! A dependency-ordered task orchestration engine.
//!
//! Taskflow runs a pipeline of named tasks arranged as a directed acyclic
//! graph, with support for:
//!
//! - **Dependency ordering**: deterministic topological order, cycle and
//!   unknown-dependency detection before anything runs
//! - **Retries**: per-task attempt limits with constant, linear or
//!   exponential backoff
//! - **Skip propagation**: a failed task skips its descendants while
//!   independent branches keep running
//! - **Run records**: a frozen per-run snapshot of every task's outcome,
//!   persisted to an in-memory or JSON-file store
//! - **Scheduling**: manual triggers, cron-style schedules and run history
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use taskflow::prelude::*;
//! use std::sync::Arc;
//!
//! let pipeline = Pipeline::new("daily_earnings_update")
//!     .add_task(TaskSpec::new("fetch_earnings", Arc::new(FetchEarnings)))?
//!     .add_task(TaskSpec::new("calculate_metrics", Arc::new(Metrics))
//!         .with_dependency("fetch_earnings"))?;
//!
//! let scheduler = Scheduler::new(Arc::new(InMemoryRunStore::new()));
//! scheduler.register(pipeline, Some("0 18 * * 1-5"))?;
//! let record = scheduler.trigger("daily_earnings_update", None).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod tasks;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::TaskflowConfig;
    pub use crate::context::RunContext;
    pub use crate::core::{RunRecord, RunStatus, RunSummary, TaskExecution, TaskStatus};
    pub use crate::errors::{
        ContractErrorInfo, CycleDetectedError, DataConflictError, PersistenceError,
        PipelineValidationError, TaskExecutionError, TaskflowError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        BackoffStrategy, EngineConfig, ExecutionEngine, ExecutionMode, JitterStrategy, Pipeline,
        RetryPolicy, TaskSpec,
    };
    pub use crate::scheduler::{Schedule, Scheduler, Trigger};
    pub use crate::store::{InMemoryRunStore, JsonFileRunStore, RunStore};
    pub use crate::tasks::{AsyncFnTask, FnTask, NoOpTask, TaskArgs, TaskBody};
    pub use crate::utils::{now_utc, Timestamp};
}
