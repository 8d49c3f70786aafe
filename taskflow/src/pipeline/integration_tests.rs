//! End-to-end tests for pipeline execution.

use crate::cancellation::CancellationToken;
use crate::context::RunContext;
use crate::core::{RunStatus, TaskStatus};
use crate::events::{self, CollectingEventSink};
use crate::pipeline::{EngineConfig, ExecutionEngine, ExecutionMode, Pipeline, TaskSpec};
use crate::tasks::{AsyncFnTask, FnTask, TaskArgs, TaskBody};
use crate::testing::{
    assert_attempts, assert_run_failed, assert_run_succeeded, assert_task_failed,
    assert_task_skipped, assert_task_succeeded, ContextReaderTask, FailingTask, FlakyTask,
    RecordingTask, SlowTask, SucceedingTask,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn no_wait() -> ExecutionEngine {
    ExecutionEngine::new(EngineConfig::new().with_max_backoff(Duration::ZERO))
}

fn parallel(max_concurrency: usize) -> ExecutionEngine {
    ExecutionEngine::new(
        EngineConfig::new()
            .with_mode(ExecutionMode::Parallel { max_concurrency })
            .with_max_backoff(Duration::ZERO),
    )
}

fn spec(id: &str, body: Arc<dyn TaskBody>, deps: &[&str]) -> TaskSpec {
    TaskSpec::new(id, body).with_dependencies(deps.iter().copied())
}

/// fetch_earnings -> calculate_metrics -> {store_results, generate_alerts}
fn earnings_pipeline(fetch: Arc<dyn TaskBody>) -> Pipeline {
    let metrics = FnTask::new("calculate_metrics", |_, ctx| {
        let rows: Vec<serde_json::Value> = ctx.require("fetch_earnings")?;
        Ok(json!({"count": rows.len()}))
    });
    Pipeline::new("daily_earnings_update")
        .add_task(spec("fetch_earnings", fetch, &[]))
        .unwrap()
        .add_task(spec("calculate_metrics", Arc::new(metrics), &["fetch_earnings"]))
        .unwrap()
        .add_task(spec("store_results", Arc::new(ContextReaderTask::new("calculate_metrics")), &["calculate_metrics"]))
        .unwrap()
        .add_task(spec("generate_alerts", Arc::new(SucceedingTask::new(json!([]))), &["calculate_metrics"]))
        .unwrap()
}

#[tokio::test]
async fn test_all_tasks_succeed() {
    let fetch = Arc::new(SucceedingTask::new(json!([{"symbol": "AAPL"}, {"symbol": "MSFT"}])));
    let pipeline = earnings_pipeline(fetch.clone());

    let record = no_wait().run(&pipeline, &RunContext::new()).await.unwrap();

    assert_run_succeeded(&record);
    for id in ["fetch_earnings", "calculate_metrics", "store_results", "generate_alerts"] {
        assert_task_succeeded(&record, id);
        assert_attempts(&record, id, 1);
    }
    assert_eq!(fetch.calls(), 1);
    assert_eq!(
        record.execution("store_results").unwrap().result,
        Some(json!({"count": 2}))
    );
    assert!(record.run_id.starts_with("daily_earnings_update_"));
}

#[tokio::test]
async fn test_failure_skips_all_descendants() {
    let pipeline = earnings_pipeline(Arc::new(FailingTask::new("provider down")));

    let record = no_wait().run(&pipeline, &RunContext::new()).await.unwrap();

    assert_run_failed(&record);
    assert_task_failed(&record, "fetch_earnings");
    assert_attempts(&record, "fetch_earnings", 3);
    assert_task_skipped(&record, "calculate_metrics");
    assert_task_skipped(&record, "store_results");
    assert_task_skipped(&record, "generate_alerts");
    assert_eq!(
        record.execution("fetch_earnings").unwrap().error.as_deref(),
        Some("provider down")
    );
    assert_eq!(
        record.execution("store_results").unwrap().skip_reason.as_deref(),
        Some("dependency 'calculate_metrics' is skipped")
    );
}

#[tokio::test]
async fn test_retry_succeeds_on_third_attempt() {
    let fetch = Arc::new(FlakyTask::new(2, json!([1, 2, 3])));
    let pipeline = earnings_pipeline(fetch.clone());

    let record = no_wait().run(&pipeline, &RunContext::new()).await.unwrap();

    assert_run_succeeded(&record);
    assert_attempts(&record, "fetch_earnings", 3);
    assert_eq!(fetch.calls(), 3);
    let exec = record.execution("fetch_earnings").unwrap();
    assert_eq!(exec.result, Some(json!([1, 2, 3])));
    assert_eq!(exec.error, None);
}

#[tokio::test]
async fn test_retry_exhaustion_keeps_last_error() {
    let fetch = Arc::new(FlakyTask::new(5, json!(null)));
    let pipeline = Pipeline::new("p")
        .add_task(spec("fetch", fetch.clone(), &[]).with_max_attempts(2))
        .unwrap();

    let record = no_wait().run(&pipeline, &RunContext::new()).await.unwrap();

    assert_task_failed(&record, "fetch");
    assert_attempts(&record, "fetch", 2);
    assert_eq!(fetch.calls(), 2);
    assert_eq!(
        record.execution("fetch").unwrap().error.as_deref(),
        Some("transient failure 2")
    );
}

#[tokio::test]
async fn test_independent_branch_still_runs() {
    let pipeline = Pipeline::new("p")
        .add_task(spec("a", Arc::new(FailingTask::new("boom")), &[]).with_max_attempts(1))
        .unwrap()
        .add_task(spec("b", Arc::new(SucceedingTask::new(json!(1))), &["a"]))
        .unwrap()
        .add_task(spec("c", Arc::new(SucceedingTask::new(json!(2))), &[]))
        .unwrap()
        .add_task(spec("d", Arc::new(SucceedingTask::new(json!(3))), &["c"]))
        .unwrap();

    let record = no_wait().run(&pipeline, &RunContext::new()).await.unwrap();

    assert_run_failed(&record);
    assert_task_failed(&record, "a");
    assert_task_skipped(&record, "b");
    assert_task_succeeded(&record, "c");
    assert_task_succeeded(&record, "d");
    assert_eq!(record.failed_tasks(), vec!["a"]);
    assert_eq!(record.skipped_tasks(), vec!["b"]);
}

#[tokio::test]
async fn test_context_passing_and_seed_values() {
    let recorder = Arc::new(RecordingTask::new(json!("done")));
    let pipeline = Pipeline::new("p")
        .add_task(spec("load", Arc::new(ContextReaderTask::new("symbols")), &[]))
        .unwrap()
        .add_task(
            spec("report", recorder.clone(), &["load"])
                .with_args(TaskArgs::new().with_kwarg("format", json!("csv"))),
        )
        .unwrap();
    let ctx = RunContext::new().with_value("symbols", json!(["AAPL"]));

    let record = no_wait().run(&pipeline, &ctx).await.unwrap();

    assert_run_succeeded(&record);
    assert_eq!(ctx.get("load"), Some(json!(["AAPL"])));
    assert_eq!(ctx.get("report"), Some(json!("done")));

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].context_keys, vec!["load", "symbols"]);
    assert_eq!(calls[0].args.kwarg("format"), Some(&json!("csv")));
}

#[tokio::test]
async fn test_failed_task_publishes_nothing() {
    let pipeline = Pipeline::new("p")
        .add_task(spec("a", Arc::new(FailingTask::new("boom")), &[]).with_max_attempts(1))
        .unwrap();
    let ctx = RunContext::new();

    no_wait().run(&pipeline, &ctx).await.unwrap();

    assert!(!ctx.contains_key("a"));
}

#[tokio::test]
async fn test_async_task_bodies() {
    let body = AsyncFnTask::new("double", |_args, ctx: RunContext| async move {
        let n: i64 = ctx.require("seed")?;
        Ok::<_, anyhow::Error>(json!(n * 2))
    });
    let pipeline = Pipeline::new("p")
        .add_task(spec("double", Arc::new(body), &[]))
        .unwrap();
    let ctx = RunContext::new().with_value("seed", json!(21));

    let record = pipeline.run(&ctx).await.unwrap();

    assert_run_succeeded(&record);
    assert_eq!(ctx.get("double"), Some(json!(42)));
}

#[tokio::test]
async fn test_timestamps_are_causal() {
    let pipeline = earnings_pipeline(Arc::new(SucceedingTask::new(json!([]))));
    let record = no_wait().run(&pipeline, &RunContext::new()).await.unwrap();

    let end = record.end_time.unwrap();
    assert!(record.start_time <= end);
    for exec in record.executions.values() {
        let started = exec.started_at.unwrap();
        let completed = exec.completed_at.unwrap();
        assert!(record.start_time <= started);
        assert!(started <= completed);
        assert!(completed <= end);
    }

    let fetch_done = record.execution("fetch_earnings").unwrap().completed_at.unwrap();
    let metrics_started = record.execution("calculate_metrics").unwrap().started_at.unwrap();
    assert!(fetch_done < metrics_started);
}

#[tokio::test]
async fn test_pipeline_reusable_across_runs() {
    let fetch = Arc::new(SucceedingTask::new(json!([])));
    let pipeline = earnings_pipeline(fetch.clone());

    let first = no_wait().run(&pipeline, &RunContext::new()).await.unwrap();
    let second = no_wait().run(&pipeline, &RunContext::new()).await.unwrap();

    assert_run_succeeded(&first);
    assert_run_succeeded(&second);
    assert_eq!(fetch.calls(), 2);
    assert_eq!(first.executions.len(), second.executions.len());
}

#[tokio::test]
async fn test_configuration_errors_run_nothing() {
    let body = Arc::new(SucceedingTask::new(json!(1)));
    let pipeline = Pipeline::new("p")
        .add_task(spec("a", body.clone(), &["missing"]))
        .unwrap();

    let err = no_wait().run(&pipeline, &RunContext::new()).await.unwrap_err();

    assert_eq!(err.code(), Some("CONTRACT-004-MISSING_DEP"));
    assert_eq!(body.calls(), 0);
}

#[tokio::test]
async fn test_parallel_matches_sequential_outcome() {
    let pipeline = Pipeline::new("p")
        .add_task(spec("a", Arc::new(FailingTask::new("boom")), &[]).with_max_attempts(2))
        .unwrap()
        .add_task(spec("b", Arc::new(SucceedingTask::new(json!(1))), &["a"]))
        .unwrap()
        .add_task(spec("c", Arc::new(SlowTask::with_delay_ms(5)), &[]))
        .unwrap()
        .add_task(spec("d", Arc::new(SucceedingTask::new(json!(3))), &["c"]))
        .unwrap()
        .add_task(spec("e", Arc::new(SucceedingTask::new(json!(4))), &["b", "d"]))
        .unwrap();

    let seq = no_wait().run(&pipeline, &RunContext::new()).await.unwrap();
    let par = parallel(4).run(&pipeline, &RunContext::new()).await.unwrap();

    for id in ["a", "b", "c", "d", "e"] {
        assert_eq!(seq.status_of(id), par.status_of(id), "status of {id}");
    }
    assert_eq!(par.overall_status, RunStatus::Failed);
    assert_eq!(par.status_of("e"), Some(TaskStatus::Skipped));
    assert_attempts(&par, "a", 2);
}

#[tokio::test]
async fn test_parallel_runs_independent_tasks_concurrently() {
    let mut pipeline = Pipeline::new("fanout");
    for i in 0..4 {
        pipeline = pipeline
            .add_task(spec(&format!("slow_{i}"), Arc::new(SlowTask::with_delay_ms(50)), &[]))
            .unwrap();
    }

    let start = std::time::Instant::now();
    let record = parallel(4).run(&pipeline, &RunContext::new()).await.unwrap();
    let elapsed = start.elapsed();

    assert_run_succeeded(&record);
    assert!(elapsed < Duration::from_millis(190), "took {elapsed:?}");
}

#[tokio::test]
async fn test_parallel_respects_dependencies() {
    let pipeline = earnings_pipeline(Arc::new(SlowTask::new(Duration::from_millis(5), json!([1]))));
    let record = parallel(8).run(&pipeline, &RunContext::new()).await.unwrap();

    assert_run_succeeded(&record);
    let metrics_done = record.execution("calculate_metrics").unwrap().completed_at.unwrap();
    for id in ["store_results", "generate_alerts"] {
        let started = record.execution(id).unwrap().started_at.unwrap();
        assert!(metrics_done < started, "{id} started before its dependency finished");
    }
}

#[tokio::test]
async fn test_cancel_before_run_skips_everything() {
    let fetch = Arc::new(SucceedingTask::new(json!([])));
    let pipeline = earnings_pipeline(fetch.clone());
    let token = CancellationToken::new();
    token.cancel("shutdown");

    let record = no_wait()
        .run_cancellable(&pipeline, &RunContext::new(), &token)
        .await
        .unwrap();

    assert_eq!(fetch.calls(), 0);
    assert_eq!(record.skipped_tasks().len(), 4);
    assert_eq!(
        record.execution("fetch_earnings").unwrap().skip_reason.as_deref(),
        Some("cancelled: shutdown")
    );
    // Nothing failed, so the run itself is not a failure.
    assert_eq!(record.overall_status, RunStatus::Success);
}

#[tokio::test]
async fn test_cancel_during_retry_wait_skips_task() {
    let fetch = Arc::new(FailingTask::new("timeout"));
    let pipeline = Pipeline::new("p")
        .add_task(
            spec("fetch", fetch.clone(), &[])
                .with_max_attempts(3)
                .with_retry_backoff(Duration::from_secs(30)),
        )
        .unwrap()
        .add_task(spec("store", Arc::new(SucceedingTask::new(json!(1))), &["fetch"]))
        .unwrap();
    let token = Arc::new(CancellationToken::new());
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel("operator");
    });

    let record = ExecutionEngine::default()
        .run_cancellable(&pipeline, &RunContext::new(), &token)
        .await
        .unwrap();

    // Attempts were left, so the task is skipped rather than failed, with
    // the attempt it did make still on the record.
    let fetch_exec = record.execution("fetch").unwrap();
    assert_eq!(fetch_exec.status, TaskStatus::Skipped);
    assert_eq!(fetch_exec.skip_reason.as_deref(), Some("cancelled: operator"));
    assert_eq!(fetch_exec.error.as_deref(), Some("timeout"));
    assert!(fetch_exec.started_at.is_some());
    assert_attempts(&record, "fetch", 1);
    assert_eq!(fetch.calls(), 1);

    assert_task_skipped(&record, "store");
    assert_eq!(
        record.execution("store").unwrap().skip_reason.as_deref(),
        Some("cancelled: operator")
    );
    assert_eq!(record.overall_status, RunStatus::Success);
}

#[tokio::test]
async fn test_retry_events_carry_attempt_and_error() {
    let sink = Arc::new(CollectingEventSink::new());
    let engine = ExecutionEngine::new(
        EngineConfig::new()
            .with_max_backoff(Duration::ZERO)
            .with_event_sink(sink.clone()),
    );
    let pipeline = Pipeline::new("p")
        .add_task(spec("fetch", Arc::new(FlakyTask::new(1, json!(1))), &[]))
        .unwrap();

    engine.run(&pipeline, &RunContext::new()).await.unwrap();

    let retries = sink.events_of_type(events::TASK_RETRYING);
    assert_eq!(retries.len(), 1);
    let data = retries[0].1.clone().unwrap();
    assert_eq!(data["task"], json!("fetch"));
    assert_eq!(data["attempt"], json!(1));
    assert_eq!(data["error"], json!("transient failure 1"));

    let completed = sink.events_of_type(events::RUN_COMPLETED);
    assert_eq!(completed[0].1.as_ref().unwrap()["status"], json!("success"));
}
