//! Cooperative cancellation for runs and the scheduler loop.

mod token;

pub use token::CancellationToken;
