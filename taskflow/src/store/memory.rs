//! In-memory run store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{select_history, RunStore};
use crate::core::RunRecord;
use crate::errors::PersistenceError;

/// A run store that keeps records in a concurrent map.
///
/// Records live as long as the store does.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    records: DashMap<String, RunRecord>,
}

impl InMemoryRunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes every record.
    pub fn clear(&self) {
        self.records.clear();
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn persist(&self, record: &RunRecord) -> Result<(), PersistenceError> {
        self.records.insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    async fn history(
        &self,
        pipeline_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, PersistenceError> {
        let records: Vec<RunRecord> = self.records.iter().map(|entry| entry.value().clone()).collect();
        Ok(select_history(records, pipeline_id, limit))
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, PersistenceError> {
        Ok(self.records.get(run_id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::pipeline::{EngineConfig, ExecutionEngine, Pipeline, TaskSpec};
    use crate::testing::{FailingTask, SucceedingTask};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    async fn finished_run() -> RunRecord {
        let pipeline = Pipeline::new("daily")
            .add_task(TaskSpec::new("fetch", Arc::new(FailingTask::new("timeout"))).with_max_attempts(2))
            .unwrap()
            .add_task(TaskSpec::new("prices", Arc::new(SucceedingTask::new(json!([1, 2])))))
            .unwrap()
            .add_task(
                TaskSpec::new("store", Arc::new(SucceedingTask::new(json!(null))))
                    .with_dependency("fetch"),
            )
            .unwrap();
        ExecutionEngine::new(EngineConfig::new().with_max_backoff(Duration::ZERO))
            .run(&pipeline, &RunContext::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_through_history() {
        let store = InMemoryRunStore::new();
        let record = finished_run().await;

        store.persist(&record).await.unwrap();
        let history = store.history(Some("daily"), 10).await.unwrap();

        assert_eq!(history, vec![record.clone()]);
        let fetch = history[0].execution("fetch").unwrap();
        assert_eq!(fetch.error.as_deref(), Some("timeout"));
        assert_eq!(fetch.attempt_count, 2);
    }

    #[tokio::test]
    async fn test_persist_is_an_upsert() {
        let store = InMemoryRunStore::new();
        let mut record = finished_run().await;

        store.persist(&record).await.unwrap();
        record.executions.clear();
        store.persist(&record).await.unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.get(&record.run_id).await.unwrap().unwrap();
        assert!(stored.executions.is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_run() {
        let store = InMemoryRunStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
        assert!(store.history(None, 10).await.unwrap().is_empty());
    }
}
