//! Timestamp and run-id helpers.

pub mod timestamps;

pub use timestamps::{
    format_iso8601, generate_run_id, iso_timestamp, now_utc, MonotonicClock, Timestamp,
};
