//! The shared data channel between tasks of one run.

mod bags;

pub use bags::RunContext;
