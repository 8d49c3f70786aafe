//! Pipeline definition and execution.
//!
//! This module provides:
//! - Task specifications and retry policies
//! - The pipeline graph with validation and topological ordering
//! - The execution engine, sequential or bounded-parallel

mod engine;
mod graph;
mod retry;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use engine::{EngineConfig, ExecutionEngine, ExecutionMode};
pub use graph::Pipeline;
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use spec::TaskSpec;
