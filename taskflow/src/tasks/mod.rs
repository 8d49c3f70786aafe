//! Task body trait and adapters.
//!
//! A task body is the opaque unit of business logic behind a pipeline node.
//! The engine only knows how to invoke it and whether it failed.

use crate::context::RunContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Static arguments bound to a task at definition time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    /// Positional arguments.
    #[serde(default)]
    pub positional: Vec<serde_json::Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub keyword: serde_json::Map<String, serde_json::Value>,
}

impl TaskArgs {
    /// Creates empty arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn with_arg(mut self, value: serde_json::Value) -> Self {
        self.positional.push(value);
        self
    }

    /// Sets a keyword argument.
    #[must_use]
    pub fn with_kwarg(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.keyword.insert(name.into(), value);
        self
    }

    /// Returns the positional argument at `index`.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&serde_json::Value> {
        self.positional.get(index)
    }

    /// Returns the keyword argument `name`.
    #[must_use]
    pub fn kwarg(&self, name: &str) -> Option<&serde_json::Value> {
        self.keyword.get(name)
    }

    /// Returns true if there are no arguments at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// Trait for task bodies.
///
/// Any `Ok` return is a success, whatever the payload looks like. Any `Err`
/// is a failed attempt; the engine retries according to the task's policy.
/// Bodies read upstream results from the context by task id and should check
/// the shape they expect (see [`RunContext::require`]).
#[async_trait]
pub trait TaskBody: Send + Sync + Debug {
    /// Invokes the body once.
    async fn invoke(&self, args: &TaskArgs, ctx: &RunContext) -> anyhow::Result<serde_json::Value>;
}

/// A task body backed by a synchronous closure.
pub struct FnTask<F>
where
    F: Fn(&TaskArgs, &RunContext) -> anyhow::Result<serde_json::Value> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnTask<F>
where
    F: Fn(&TaskArgs, &RunContext) -> anyhow::Result<serde_json::Value> + Send + Sync,
{
    /// Creates a new function-based task body.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnTask<F>
where
    F: Fn(&TaskArgs, &RunContext) -> anyhow::Result<serde_json::Value> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> TaskBody for FnTask<F>
where
    F: Fn(&TaskArgs, &RunContext) -> anyhow::Result<serde_json::Value> + Send + Sync,
{
    async fn invoke(&self, args: &TaskArgs, ctx: &RunContext) -> anyhow::Result<serde_json::Value> {
        (self.func)(args, ctx)
    }
}

/// A task body backed by an async closure.
///
/// The closure receives owned copies of the arguments and of the context as
/// it stood when the attempt began.
pub struct AsyncFnTask<F, Fut>
where
    F: Fn(TaskArgs, RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnTask<F, Fut>
where
    F: Fn(TaskArgs, RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send,
{
    /// Creates a new async function-based task body.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnTask<F, Fut>
where
    F: Fn(TaskArgs, RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnTask").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> TaskBody for AsyncFnTask<F, Fut>
where
    F: Fn(TaskArgs, RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send,
{
    async fn invoke(&self, args: &TaskArgs, ctx: &RunContext) -> anyhow::Result<serde_json::Value> {
        (self.func)(args.clone(), ctx.clone()).await
    }
}

/// A body that does nothing and returns `null`.
#[derive(Debug, Clone, Default)]
pub struct NoOpTask;

#[async_trait]
impl TaskBody for NoOpTask {
    async fn invoke(&self, _args: &TaskArgs, _ctx: &RunContext) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }
}
