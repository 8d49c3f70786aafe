//! Event sink system for observability.
//!
//! The engine reports every state transition of a run through an
//! [`EventSink`]. Sinks are passed in explicitly with the engine
//! configuration; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
#[cfg(test)]
pub use sink::MockEventSink;

/// A run was opened.
pub const RUN_STARTED: &str = "run.started";
/// A run was finalized.
pub const RUN_COMPLETED: &str = "run.completed";
/// A task passed its gate and began its first attempt.
pub const TASK_STARTED: &str = "task.started";
/// An attempt failed and another one will follow.
pub const TASK_RETRYING: &str = "task.retrying";
/// A task succeeded.
pub const TASK_SUCCEEDED: &str = "task.succeeded";
/// A task exhausted its attempts.
pub const TASK_FAILED: &str = "task.failed";
/// A task was skipped.
pub const TASK_SKIPPED: &str = "task.skipped";
