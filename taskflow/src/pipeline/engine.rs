//! The execution engine: gating, retries and run status aggregation.
//!
//! Tasks run in the order computed by [`Pipeline::execution_order`]. A task
//! whose dependencies did not all succeed is skipped without running, which
//! spreads transitively through the graph. A task that exhausts its attempts
//! is marked failed and only its descendants are affected; everything else
//! still runs.

use super::{Pipeline, RetryPolicy, TaskSpec};
use crate::cancellation::CancellationToken;
use crate::context::RunContext;
use crate::core::{RunRecord, TaskExecution};
use crate::errors::{ContractErrorInfo, PipelineValidationError, TaskExecutionError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::utils::MonotonicClock;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// How ready tasks are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ExecutionMode {
    /// One task at a time, strictly in execution order.
    #[default]
    Sequential,
    /// Independent ready tasks run concurrently, up to a limit.
    Parallel {
        /// Maximum number of tasks in flight.
        max_concurrency: usize,
    },
}

/// Engine configuration.
#[derive(Clone)]
pub struct EngineConfig {
    /// Scheduling mode.
    pub mode: ExecutionMode,
    /// Upper bound on the sleep between attempts, overriding longer task
    /// backoffs. `Some(Duration::ZERO)` disables sleeping altogether.
    pub max_backoff: Option<Duration>,
    /// Retry policy for tasks that do not set their own.
    pub default_retry: RetryPolicy,
    /// Where run and task events go.
    pub event_sink: Arc<dyn EventSink>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            max_backoff: None,
            default_retry: RetryPolicy::default(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("mode", &self.mode)
            .field("max_backoff", &self.max_backoff)
            .field("default_retry", &self.default_retry)
            .finish_non_exhaustive()
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scheduling mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Caps the sleep between attempts.
    #[must_use]
    pub fn with_max_backoff(mut self, cap: Duration) -> Self {
        self.max_backoff = Some(cap);
        self
    }

    /// Sets the retry policy for tasks without one.
    #[must_use]
    pub fn with_default_retry(mut self, retry: RetryPolicy) -> Self {
        self.default_retry = retry;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }
}

/// Runs pipelines and produces run records.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs a pipeline to completion.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, before any task runs, if the pipeline
    /// is malformed or the context already holds a value under a task id.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        ctx: &RunContext,
    ) -> Result<RunRecord, PipelineValidationError> {
        self.execute(pipeline, ctx, None).await
    }

    /// Runs a pipeline that can be cancelled.
    ///
    /// On cancellation the engine stops starting tasks, lets attempts that
    /// are already running finish, and marks every task that has not reached
    /// a terminal status as skipped. A task waiting to retry is skipped too;
    /// its attempts and last error stay on the record.
    ///
    /// # Errors
    ///
    /// Same as [`ExecutionEngine::run`].
    pub async fn run_cancellable(
        &self,
        pipeline: &Pipeline,
        ctx: &RunContext,
        token: &CancellationToken,
    ) -> Result<RunRecord, PipelineValidationError> {
        self.execute(pipeline, ctx, Some(token)).await
    }

    async fn execute(
        &self,
        pipeline: &Pipeline,
        ctx: &RunContext,
        token: Option<&CancellationToken>,
    ) -> Result<RunRecord, PipelineValidationError> {
        let tasks = pipeline.ordered_tasks()?;
        check_context_keys(&tasks, ctx)?;

        let clock = MonotonicClock::new();
        let mut record = RunRecord::open(
            pipeline.id(),
            clock.now(),
            tasks.iter().map(|t| t.id.as_str()),
        );

        let span = info_span!(
            "pipeline_run",
            pipeline = %pipeline.id(),
            run_id = %record.run_id,
            task_count = tasks.len(),
        );

        async {
            info!(mode = ?self.config.mode, "Starting pipeline run");
            self.emit(
                events::RUN_STARTED,
                json!({
                    "pipeline": pipeline.id(),
                    "run_id": &record.run_id,
                    "order": tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
                }),
            );

            match self.config.mode {
                ExecutionMode::Sequential => {
                    self.run_sequential(&tasks, ctx, &clock, token, &mut record).await;
                }
                ExecutionMode::Parallel { max_concurrency } => {
                    self.run_parallel(&tasks, ctx, &clock, token, max_concurrency.max(1), &mut record)
                        .await;
                }
            }

            record.finalize(clock.now());
            let summary = record.summary();
            info!(
                status = %record.overall_status,
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                "Pipeline run completed"
            );
            self.emit(
                events::RUN_COMPLETED,
                json!({
                    "pipeline": pipeline.id(),
                    "run_id": &record.run_id,
                    "status": record.overall_status,
                    "summary": summary,
                }),
            );
        }
        .instrument(span)
        .await;

        Ok(record)
    }

    async fn run_sequential(
        &self,
        tasks: &[&TaskSpec],
        ctx: &RunContext,
        clock: &MonotonicClock,
        token: Option<&CancellationToken>,
        record: &mut RunRecord,
    ) {
        for task in tasks {
            if let Some(reason) = cancel_reason(token) {
                self.skip(record, &task.id, format!("cancelled: {reason}"), clock);
                continue;
            }
            if let Some(reason) = unmet_dependency(task, record) {
                self.skip(record, &task.id, reason, clock);
                continue;
            }
            let execution = self.execute_task(task, ctx, clock, token).await;
            record.executions.insert(task.id.clone(), execution);
        }
    }

    async fn run_parallel(
        &self,
        tasks: &[&TaskSpec],
        ctx: &RunContext,
        clock: &MonotonicClock,
        token: Option<&CancellationToken>,
        max_concurrency: usize,
        record: &mut RunRecord,
    ) {
        let mut waiting: Vec<&TaskSpec> = tasks.to_vec();
        let mut in_flight = FuturesUnordered::new();

        loop {
            // Skips can unblock further skips, so sweep until nothing changes.
            let mut progressed = true;
            while progressed {
                progressed = false;
                let mut still_waiting = Vec::with_capacity(waiting.len());
                for task in waiting {
                    if cancel_reason(token).is_some() || !dependencies_terminal(task, record) {
                        still_waiting.push(task);
                    } else if let Some(reason) = unmet_dependency(task, record) {
                        self.skip(record, &task.id, reason, clock);
                        progressed = true;
                    } else if in_flight.len() < max_concurrency {
                        debug!(task = %task.id, "Dispatching task");
                        in_flight.push(async move {
                            (task.id.clone(), self.execute_task(task, ctx, clock, token).await)
                        });
                    } else {
                        still_waiting.push(task);
                    }
                }
                waiting = still_waiting;
            }

            match in_flight.next().await {
                Some((id, execution)) => {
                    record.executions.insert(id, execution);
                }
                None => break,
            }
        }

        let reason = cancel_reason(token).map_or_else(
            || "not scheduled".to_string(),
            |reason| format!("cancelled: {reason}"),
        );
        for task in waiting {
            self.skip(record, &task.id, reason.clone(), clock);
        }
    }

    /// Runs one task through all of its attempts.
    async fn execute_task(
        &self,
        task: &TaskSpec,
        ctx: &RunContext,
        clock: &MonotonicClock,
        token: Option<&CancellationToken>,
    ) -> TaskExecution {
        let policy = task.retry_policy(&self.config.default_retry);
        let mut execution = TaskExecution::new();
        execution.start(clock.now());
        self.emit(
            events::TASK_STARTED,
            json!({"task": &task.id, "max_attempts": policy.max_attempts}),
        );

        loop {
            let attempt = execution.begin_attempt();
            debug!(task = %task.id, attempt, max_attempts = policy.max_attempts, "Running task");

            let error = match task.body.invoke(&task.args, ctx).await {
                Ok(result) => match ctx.set(task.id.clone(), result.clone()) {
                    Ok(()) => {
                        execution.succeed(result, clock.now());
                        info!(task = %task.id, attempt, "Task succeeded");
                        self.emit(
                            events::TASK_SUCCEEDED,
                            json!({"task": &task.id, "attempts": attempt}),
                        );
                        return execution;
                    }
                    Err(conflict) => {
                        // Not retryable: the key stays taken.
                        execution.record_attempt_error(conflict.to_string());
                        break;
                    }
                },
                Err(source) => TaskExecutionError::new(&task.id, attempt, &source),
            };

            execution.record_attempt_error(error.message.clone());

            if !policy.allows_retry_after(attempt) {
                break;
            }
            if let Some(reason) = cancel_reason(token) {
                warn!(task = %task.id, %reason, "Run cancelled between attempts");
                return self.abandon(execution, &task.id, &reason, clock);
            }

            let delay = self.backoff_for(policy, attempt);
            warn!(
                task = %task.id,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Task attempt failed, retrying"
            );
            self.emit(
                events::TASK_RETRYING,
                json!({
                    "task": &task.id,
                    "attempt": attempt,
                    "error": &error.message,
                    "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                }),
            );
            sleep_unless_cancelled(delay, token).await;
            if let Some(reason) = cancel_reason(token) {
                warn!(task = %task.id, %reason, "Run cancelled during retry wait");
                return self.abandon(execution, &task.id, &reason, clock);
            }
        }

        execution.fail(clock.now());
        warn!(
            task = %task.id,
            attempts = execution.attempt_count,
            error = execution.error.as_deref().unwrap_or_default(),
            "Task failed"
        );
        self.emit(
            events::TASK_FAILED,
            json!({
                "task": &task.id,
                "attempts": execution.attempt_count,
                "error": &execution.error,
            }),
        );
        execution
    }

    /// Ends a task that still had attempts left when the run was cancelled.
    fn abandon(
        &self,
        mut execution: TaskExecution,
        task_id: &str,
        reason: &str,
        clock: &MonotonicClock,
    ) -> TaskExecution {
        let reason = format!("cancelled: {reason}");
        self.emit(
            events::TASK_SKIPPED,
            json!({"task": task_id, "reason": &reason, "attempts": execution.attempt_count}),
        );
        execution.skip(reason, clock.now());
        execution
    }

    fn backoff_for(&self, policy: &RetryPolicy, failures: u32) -> Duration {
        let delay = policy.delay_after(failures);
        self.config.max_backoff.map_or(delay, |cap| delay.min(cap))
    }

    fn skip(&self, record: &mut RunRecord, task_id: &str, reason: String, clock: &MonotonicClock) {
        if let Some(execution) = record.execution_mut(task_id) {
            info!(task = %task_id, %reason, "Skipping task");
            self.emit(events::TASK_SKIPPED, json!({"task": task_id, "reason": &reason}));
            execution.skip(reason, clock.now());
        }
    }

    fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.config.event_sink.emit(event_type, Some(data));
    }
}

/// Rejects contexts that already hold a value under one of the task ids.
fn check_context_keys(tasks: &[&TaskSpec], ctx: &RunContext) -> Result<(), PipelineValidationError> {
    let taken: Vec<String> = tasks
        .iter()
        .filter(|t| ctx.contains_key(&t.id))
        .map(|t| t.id.clone())
        .collect();
    if taken.is_empty() {
        return Ok(());
    }
    Err(PipelineValidationError::new(format!(
        "Context already holds values for task ids: {}",
        taken.join(", ")
    ))
    .with_tasks(taken)
    .with_error_info(
        ContractErrorInfo::new(
            "CONTRACT-004-CONTEXT_KEY",
            "Seed values must not use task ids as keys",
        )
        .with_fix_hint("Rename the seed value or start the run with a fresh context."),
    ))
}

/// Returns the reason to skip `task`, if any dependency did not succeed.
fn unmet_dependency(task: &TaskSpec, record: &RunRecord) -> Option<String> {
    task.dependencies.iter().find_map(|dep| {
        let status = record.status_of(dep)?;
        (!status.is_success()).then(|| format!("dependency '{dep}' is {status}"))
    })
}

fn dependencies_terminal(task: &TaskSpec, record: &RunRecord) -> bool {
    task.dependencies
        .iter()
        .all(|dep| record.status_of(dep).is_some_and(|s| s.is_terminal()))
}

fn cancel_reason(token: Option<&CancellationToken>) -> Option<String> {
    token
        .filter(|t| t.is_cancelled())
        .map(|t| t.reason().unwrap_or_else(|| "cancelled".to_string()))
}

async fn sleep_unless_cancelled(delay: Duration, token: Option<&CancellationToken>) {
    if delay.is_zero() {
        return;
    }
    match token {
        Some(token) => {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = token.cancelled() => {}
            }
        }
        None => tokio::time::sleep(delay).await,
    }
}
