//! Scheduler facade: registration, manual triggers and run history.
//!
//! The scheduler owns a registry of pipelines keyed by id, an execution
//! engine, and a [`RunStore`]. Every run it starts is persisted before the
//! record is handed back. Pipelines registered with a trigger expression are
//! also started by [`Scheduler::run_due`], which [`Scheduler::run_forever`]
//! polls on a fixed tick.

mod trigger;

pub use trigger::{CronSchedule, Trigger};

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, Instrument};

use crate::cancellation::CancellationToken;
use crate::config::TaskflowConfig;
use crate::context::RunContext;
use crate::core::RunRecord;
use crate::errors::TaskflowError;
use crate::pipeline::{ExecutionEngine, Pipeline};
use crate::store::RunStore;
use crate::utils::{now_utc, Timestamp};

const DEFAULT_HISTORY_LIMIT: usize = 10;

/// A registered pipeline and its trigger.
#[derive(Debug, Clone)]
pub struct Schedule {
    pipeline: Arc<Pipeline>,
    expression: Option<String>,
    trigger: Option<Trigger>,
    last_run: Option<Timestamp>,
    last_fired: Option<Timestamp>,
}

impl Schedule {
    /// Returns the pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the trigger expression as registered.
    #[must_use]
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    /// Returns the parsed trigger.
    #[must_use]
    pub fn trigger(&self) -> Option<&Trigger> {
        self.trigger.as_ref()
    }

    /// Start time of the most recent run, manual or scheduled.
    #[must_use]
    pub fn last_run(&self) -> Option<Timestamp> {
        self.last_run
    }

    fn is_due(&self, now: Timestamp) -> bool {
        self.trigger
            .as_ref()
            .is_some_and(|trigger| trigger.is_due(now, self.last_fired))
    }
}

/// Runs registered pipelines and records their history.
pub struct Scheduler {
    store: Arc<dyn RunStore>,
    engine: ExecutionEngine,
    history_limit: usize,
    schedules: RwLock<BTreeMap<String, Schedule>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("engine", &self.engine)
            .field("history_limit", &self.history_limit)
            .field("pipelines", &self.pipeline_ids())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler with the default engine.
    #[must_use]
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self {
            store,
            engine: ExecutionEngine::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            schedules: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates a scheduler configured from `config`.
    #[must_use]
    pub fn with_config(store: Arc<dyn RunStore>, config: &TaskflowConfig) -> Self {
        Self {
            engine: ExecutionEngine::new(config.engine_config()),
            history_limit: config.history_limit,
            ..Self::new(store)
        }
    }

    /// Replaces the execution engine.
    #[must_use]
    pub fn with_engine(mut self, engine: ExecutionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Registers a pipeline, optionally with a trigger expression.
    ///
    /// Registering an id that is already known replaces the earlier
    /// pipeline and its schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is malformed or the trigger does not
    /// parse. Nothing is registered in that case.
    pub fn register(&self, pipeline: Pipeline, trigger: Option<&str>) -> Result<(), TaskflowError> {
        pipeline.validate()?;
        let parsed = trigger.map(Trigger::parse).transpose()?;

        let id = pipeline.id().to_string();
        info!(pipeline = %id, trigger = ?trigger, "Registering pipeline");
        self.schedules.write().insert(
            id,
            Schedule {
                pipeline: Arc::new(pipeline),
                expression: trigger.map(str::to_string),
                trigger: parsed,
                last_run: None,
                last_fired: None,
            },
        );
        Ok(())
    }

    /// Removes a pipeline. Returns true if it was registered.
    pub fn unregister(&self, pipeline_id: &str) -> bool {
        self.schedules.write().remove(pipeline_id).is_some()
    }

    /// Returns the registered pipeline ids, sorted.
    #[must_use]
    pub fn pipeline_ids(&self) -> Vec<String> {
        self.schedules.read().keys().cloned().collect()
    }

    /// Returns a snapshot of a registration.
    #[must_use]
    pub fn schedule(&self, pipeline_id: &str) -> Option<Schedule> {
        self.schedules.read().get(pipeline_id).cloned()
    }

    /// Runs a registered pipeline now and persists the record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::PipelineNotFound`] for an unknown id and
    /// [`TaskflowError::Persistence`] if the record could not be stored.
    /// Task failures are not errors; they are on the returned record.
    pub async fn trigger(
        &self,
        pipeline_id: &str,
        context: Option<RunContext>,
    ) -> Result<RunRecord, TaskflowError> {
        let pipeline = self
            .schedules
            .read()
            .get(pipeline_id)
            .map(|schedule| Arc::clone(&schedule.pipeline))
            .ok_or_else(|| TaskflowError::PipelineNotFound(pipeline_id.to_string()))?;

        let ctx = context.unwrap_or_default();
        let record = self.engine.run(&pipeline, &ctx).await?;

        if let Some(schedule) = self.schedules.write().get_mut(pipeline_id) {
            schedule.last_run = Some(record.start_time);
        }

        self.store.persist(&record).await?;
        info!(
            pipeline = %pipeline_id,
            run_id = %record.run_id,
            status = %record.overall_status,
            "Run persisted"
        );
        Ok(record)
    }

    /// Returns stored runs, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn history(
        &self,
        pipeline_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, TaskflowError> {
        Ok(self.store.history(pipeline_id, limit).await?)
    }

    /// Returns stored runs using the configured history limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn recent_history(
        &self,
        pipeline_id: Option<&str>,
    ) -> Result<Vec<RunRecord>, TaskflowError> {
        self.history(pipeline_id, self.history_limit).await
    }

    /// Triggers every pipeline whose schedule is due at `now`.
    ///
    /// Each due pipeline runs once per matching period. Results are
    /// returned per pipeline id; one failure does not stop the others.
    pub async fn run_due(&self, now: Timestamp) -> Vec<(String, Result<RunRecord, TaskflowError>)> {
        let due: Vec<String> = {
            let mut schedules = self.schedules.write();
            schedules
                .iter_mut()
                .filter(|(_, schedule)| schedule.is_due(now))
                .map(|(id, schedule)| {
                    schedule.last_fired = Some(now);
                    id.clone()
                })
                .collect()
        };

        let mut outcomes = Vec::with_capacity(due.len());
        for id in due {
            let outcome = self.trigger(&id, None).await;
            if let Err(e) = &outcome {
                error!(pipeline = %id, error = %e, "Scheduled run failed");
            }
            outcomes.push((id, outcome));
        }
        outcomes
    }

    /// Polls [`Scheduler::run_due`] every `tick` until `token` is cancelled.
    ///
    /// A run that is already in progress when cancellation arrives is
    /// finished and persisted first.
    pub async fn run_forever(&self, tick: Duration, token: &CancellationToken) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        async {
            info!(tick_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX), "Scheduler started");
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        let outcomes = self.run_due(now_utc()).await;
                        if !outcomes.is_empty() {
                            info!(runs = outcomes.len(), "Scheduled runs finished");
                        }
                    }
                }
            }
            info!(reason = ?token.reason(), "Scheduler stopped");
        }
        .instrument(info_span!("scheduler"))
        .await;
    }
}
