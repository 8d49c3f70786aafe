//! Mock task bodies for testing.

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::context::RunContext;
use crate::tasks::{TaskArgs, TaskBody};

/// A body that always succeeds with a fixed value.
#[derive(Debug)]
pub struct SucceedingTask {
    value: serde_json::Value,
    calls: AtomicU32,
}

impl SucceedingTask {
    /// Creates a body returning `value`.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            calls: AtomicU32::new(0),
        }
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskBody for SucceedingTask {
    async fn invoke(&self, _args: &TaskArgs, _ctx: &RunContext) -> anyhow::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.clone())
    }
}

/// A body that always fails with the same message.
#[derive(Debug)]
pub struct FailingTask {
    error: String,
    calls: AtomicU32,
}

impl FailingTask {
    /// Creates a failing body.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            calls: AtomicU32::new(0),
        }
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskBody for FailingTask {
    async fn invoke(&self, _args: &TaskArgs, _ctx: &RunContext) -> anyhow::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("{}", self.error))
    }
}

/// A body that fails a set number of times, then succeeds.
///
/// Attempt `n` fails with `"transient failure {n}"`, so the text left on the
/// record tells which attempt failed last.
#[derive(Debug)]
pub struct FlakyTask {
    failures: u32,
    value: serde_json::Value,
    calls: AtomicU32,
}

impl FlakyTask {
    /// Creates a body that fails `failures` times before returning `value`.
    #[must_use]
    pub fn new(failures: u32, value: serde_json::Value) -> Self {
        Self {
            failures,
            value,
            calls: AtomicU32::new(0),
        }
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskBody for FlakyTask {
    async fn invoke(&self, _args: &TaskArgs, _ctx: &RunContext) -> anyhow::Result<serde_json::Value> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            bail!("transient failure {attempt}");
        }
        Ok(self.value.clone())
    }
}

/// A body that sleeps before succeeding.
#[derive(Debug)]
pub struct SlowTask {
    delay: Duration,
    value: serde_json::Value,
}

impl SlowTask {
    /// Creates a slow body.
    #[must_use]
    pub fn new(delay: Duration, value: serde_json::Value) -> Self {
        Self { delay, value }
    }

    /// Creates a slow body returning `null`, with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms), serde_json::Value::Null)
    }
}

#[async_trait]
impl TaskBody for SlowTask {
    async fn invoke(&self, _args: &TaskArgs, _ctx: &RunContext) -> anyhow::Result<serde_json::Value> {
        tokio::time::sleep(self.delay).await;
        Ok(self.value.clone())
    }
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The arguments the body received.
    pub args: TaskArgs,
    /// Context keys visible at invocation time, sorted.
    pub context_keys: Vec<String>,
}

/// A body that records every invocation and succeeds with a fixed value.
#[derive(Debug)]
pub struct RecordingTask {
    value: serde_json::Value,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingTask {
    /// Creates a recording body.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns all recorded invocations.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TaskBody for RecordingTask {
    async fn invoke(&self, args: &TaskArgs, ctx: &RunContext) -> anyhow::Result<serde_json::Value> {
        self.calls.lock().push(RecordedCall {
            args: args.clone(),
            context_keys: ctx.keys(),
        });
        Ok(self.value.clone())
    }
}

/// A body that returns whatever the context holds under a key.
///
/// Fails when the key is absent, which makes it a convenient downstream task
/// for checking what upstream tasks published.
#[derive(Debug)]
pub struct ContextReaderTask {
    key: String,
}

impl ContextReaderTask {
    /// Creates a body reading `key`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl TaskBody for ContextReaderTask {
    async fn invoke(&self, _args: &TaskArgs, ctx: &RunContext) -> anyhow::Result<serde_json::Value> {
        ctx.get(&self.key)
            .ok_or_else(|| anyhow!("context key '{}' is missing", self.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_succeeding_task() {
        let task = SucceedingTask::new(json!(42));
        let value = task.invoke(&TaskArgs::new(), &RunContext::new()).await.unwrap();
        assert_eq!(value, json!(42));
        assert_eq!(task.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_task() {
        let task = FailingTask::new("provider down");
        let err = task.invoke(&TaskArgs::new(), &RunContext::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "provider down");
        assert_eq!(task.calls(), 1);
    }

    #[tokio::test]
    async fn test_flaky_task() {
        let task = FlakyTask::new(2, json!("ok"));
        let ctx = RunContext::new();
        let args = TaskArgs::new();

        let first = task.invoke(&args, &ctx).await.unwrap_err();
        assert_eq!(first.to_string(), "transient failure 1");
        let second = task.invoke(&args, &ctx).await.unwrap_err();
        assert_eq!(second.to_string(), "transient failure 2");
        assert_eq!(task.invoke(&args, &ctx).await.unwrap(), json!("ok"));
        assert_eq!(task.calls(), 3);
    }

    #[tokio::test]
    async fn test_slow_task() {
        let task = SlowTask::with_delay_ms(10);
        let start = std::time::Instant::now();
        task.invoke(&TaskArgs::new(), &RunContext::new()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_recording_task() {
        let task = RecordingTask::new(json!(null));
        let ctx = RunContext::new().with_value("b", json!(1)).with_value("a", json!(2));
        let args = TaskArgs::new().with_kwarg("symbol", json!("AAPL"));

        task.invoke(&args, &ctx).await.unwrap();

        let calls = task.calls();
        assert_eq!(task.call_count(), 1);
        assert_eq!(calls[0].context_keys, vec!["a", "b"]);
        assert_eq!(calls[0].args.kwarg("symbol"), Some(&json!("AAPL")));
    }

    #[tokio::test]
    async fn test_context_reader_task() {
        let task = ContextReaderTask::new("fetch");
        let ctx = RunContext::new().with_value("fetch", json!([1, 2]));
        assert_eq!(task.invoke(&TaskArgs::new(), &ctx).await.unwrap(), json!([1, 2]));

        let err = task
            .invoke(&TaskArgs::new(), &RunContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "context key 'fetch' is missing");
    }
}
