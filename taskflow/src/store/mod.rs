//! Persistence of run records.
//!
//! A [`RunStore`] keeps finalized [`RunRecord`]s keyed by run id and answers
//! history queries newest first. Two implementations ship with the crate:
//! [`InMemoryRunStore`] for tests and short-lived processes, and
//! [`JsonFileRunStore`] which keeps one JSON document per run on disk.

mod file;
mod memory;

pub use file::JsonFileRunStore;
pub use memory::InMemoryRunStore;

use async_trait::async_trait;
use std::cmp::Ordering;

use crate::core::RunRecord;
use crate::errors::PersistenceError;

/// Storage backend for run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Stores a record, replacing any earlier record with the same run id.
    ///
    /// Returns only once the record is durably recorded.
    async fn persist(&self, record: &RunRecord) -> Result<(), PersistenceError>;

    /// Returns up to `limit` records, most recent start time first.
    ///
    /// When `pipeline_id` is given only that pipeline's runs are returned.
    async fn history(
        &self,
        pipeline_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, PersistenceError>;

    /// Returns a single record by run id.
    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, PersistenceError>;
}

/// Newest `start_time` first; equal start times fall back to `run_id`,
/// descending.
pub(crate) fn newest_first(a: &RunRecord, b: &RunRecord) -> Ordering {
    b.start_time
        .cmp(&a.start_time)
        .then_with(|| b.run_id.cmp(&a.run_id))
}

/// Filters, orders and truncates records for a history query.
pub(crate) fn select_history(
    records: impl IntoIterator<Item = RunRecord>,
    pipeline_id: Option<&str>,
    limit: usize,
) -> Vec<RunRecord> {
    let mut selected: Vec<RunRecord> = records
        .into_iter()
        .filter(|r| pipeline_id.map_or(true, |id| r.pipeline_id == id))
        .collect();
    selected.sort_by(newest_first);
    selected.truncate(limit);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(pipeline: &str, offset_secs: i64) -> RunRecord {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap() + Duration::seconds(offset_secs);
        let mut record = RunRecord::open(pipeline, start, ["a"]);
        record.finalize(start + Duration::seconds(1));
        record
    }

    #[test]
    fn test_select_history_orders_newest_first() {
        let records = vec![record("p", 0), record("p", 20), record("p", 10)];
        let selected = select_history(records, None, 10);
        let offsets: Vec<_> = selected.iter().map(|r| r.start_time.timestamp() % 60).collect();
        assert_eq!(offsets, vec![20, 10, 0]);
    }

    #[test]
    fn test_select_history_filters_and_limits() {
        let records = vec![record("p", 0), record("q", 5), record("p", 10), record("p", 20)];
        let selected = select_history(records, Some("p"), 2);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|r| r.pipeline_id == "p"));
        assert_eq!(selected[0].start_time.timestamp() % 60, 20);
    }

    #[test]
    fn test_equal_start_times_break_ties_by_run_id() {
        let mut a = record("alpha", 0);
        let mut b = record("beta", 0);
        a.run_id = "alpha_run".into();
        b.run_id = "beta_run".into();
        let selected = select_history(vec![a, b], None, 10);
        assert_eq!(selected[0].run_id, "beta_run");
        assert_eq!(selected[1].run_id, "alpha_run");
    }
}
