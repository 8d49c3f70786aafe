//! Timestamp utilities for run records.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// # Examples
///
/// ```
/// use taskflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&Utc::now())
}

/// Formats a timestamp as ISO 8601 string.
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Builds a run id from a pipeline id and the run's start time.
///
/// The microsecond suffix keeps back-to-back runs of the same pipeline apart.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use taskflow::utils::generate_run_id;
///
/// let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 5).unwrap();
/// assert_eq!(generate_run_id("daily", &at), "daily_20240301_093005_000000");
/// ```
#[must_use]
pub fn generate_run_id(pipeline_id: &str, at: &Timestamp) -> String {
    format!("{}_{}", pipeline_id, at.format("%Y%m%d_%H%M%S_%6f"))
}

/// A clock whose readings never repeat or go backwards.
///
/// Run records compare `completed_at` of a dependency against `started_at`
/// of its dependents, so two readings taken in the same nanosecond still
/// have to be ordered.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<Timestamp>>,
}

impl MonotonicClock {
    /// Creates a new clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current time, bumped past the previous reading if needed.
    pub fn now(&self) -> Timestamp {
        let mut last = self.last.lock();
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}
