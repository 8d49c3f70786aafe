//! Core domain model types for taskflow.
//!
//! This module contains the data the engine produces:
//! - Task and run status enums
//! - Per-task execution state
//! - Run records and summaries

mod execution;
mod record;
mod status;

pub use execution::TaskExecution;
pub use record::{RunRecord, RunSummary};
pub use status::{RunStatus, TaskStatus};
