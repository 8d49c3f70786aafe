//! Testing utilities for taskflow pipelines.
//!
//! This module provides:
//! - Mock task bodies that succeed, fail, flake or record their calls
//! - Assertions over run records

mod assertions;
mod mocks;

pub use assertions::{
    assert_attempts, assert_run_failed, assert_run_succeeded, assert_task_failed,
    assert_task_skipped, assert_task_status, assert_task_succeeded,
};
pub use mocks::{
    ContextReaderTask, FailingTask, FlakyTask, RecordedCall, RecordingTask, SlowTask,
    SucceedingTask,
};
