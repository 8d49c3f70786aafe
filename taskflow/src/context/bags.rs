//! Thread-safe run context.

use crate::errors::DataConflictError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// The shared mapping from task id to that task's successful result.
///
/// It is the only channel through which tasks exchange data. Every key is
/// written at most once; reads can happen from any number of tasks,
/// including concurrently running ones.
#[derive(Debug, Default)]
pub struct RunContext {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl RunContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded with caller-provided values.
    #[must_use]
    pub fn from_data(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Adds a seed value, replacing any previous one.
    #[must_use]
    pub fn with_value(self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.write().insert(key.into(), value);
        self
    }

    /// Gets a value from the context.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.read().get(key).cloned()
    }

    /// Reads a value and decodes it into the shape the caller expects.
    ///
    /// # Errors
    ///
    /// Fails if the key is absent or the value does not decode as `T`.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<T> {
        let value = self
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("context has no value for '{key}'"))?;
        serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("context value '{key}' has an unexpected shape: {e}"))
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Sets a value in the context.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if the key already exists.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) -> Result<(), DataConflictError> {
        let key = key.into();
        let mut data = self.data.write();

        if data.contains_key(&key) {
            return Err(DataConflictError::new(&key));
        }

        data.insert(key, value);
        Ok(())
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, serde_json::Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the context is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns all keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Clone for RunContext {
    fn clone(&self) -> Self {
        Self {
            data: RwLock::new(self.data.read().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let ctx = RunContext::new();
        ctx.set("fetch", json!({"AAPL": 1.2})).unwrap();
        assert_eq!(ctx.get("fetch"), Some(json!({"AAPL": 1.2})));
        assert!(ctx.contains_key("fetch"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_write_once() {
        let ctx = RunContext::new();
        ctx.set("fetch", json!(1)).unwrap();
        let err = ctx.set("fetch", json!(2)).unwrap_err();
        assert_eq!(err.key, "fetch");
        assert_eq!(ctx.get("fetch"), Some(json!(1)));
    }

    #[test]
    fn test_seeded_values() {
        let ctx = RunContext::new().with_value("tickers", json!(["AAPL", "MSFT"]));
        let tickers: Vec<String> = ctx.require("tickers").unwrap();
        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_require_reports_missing_and_bad_shape() {
        let ctx = RunContext::new().with_value("count", json!("three"));

        let missing = ctx.require::<u32>("absent").unwrap_err();
        assert!(missing.to_string().contains("no value for 'absent'"));

        let shape = ctx.require::<u32>("count").unwrap_err();
        assert!(shape.to_string().contains("unexpected shape"));
    }

    #[test]
    fn test_clone_is_independent() {
        let ctx = RunContext::new();
        ctx.set("a", json!(1)).unwrap();
        let copy = ctx.clone();
        copy.set("b", json!(2)).unwrap();
        assert!(!ctx.contains_key("b"));
        assert_eq!(copy.keys(), vec!["a", "b"]);
    }
}
