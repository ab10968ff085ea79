//! Execution context shared by every node and step of a workflow.
//!
//! `ExecutionContext` couples the workflow's data bag with the cancellation
//! source of the active run. The data bag is created once per workflow and
//! shared by reference across runs. Each run records its source in a slot
//! shared by every clone, so cancelling through the workflow's context
//! reaches the most recently started run. Contexts handed to a run's steps
//! stay bound to that run's own source.
//!
//! There is no locking beyond the per-entry sharding of the underlying
//! `DashMap`: sequential steps may mutate freely, while parallel steps
//! writing the same key race by construction.

use std::sync::{Arc, RwLock};

use chainflow_types::error::WorkflowError;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::cancellation::{CancellationSource, CancellationToken};

/// Shared data bag plus the active cancellation source.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    data: Arc<DashMap<String, Value>>,
    /// Source of the most recently started run.
    active: Arc<RwLock<CancellationSource>>,
    /// Set on contexts created for a run.
    bound: Option<CancellationSource>,
}

impl ExecutionContext {
    /// Create an empty context with a fresh cancellation source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with caller-supplied data.
    pub fn with_data<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let data = DashMap::new();
        for (key, value) in entries {
            data.insert(key.into(), value);
        }
        Self {
            data: Arc::new(data),
            ..Self::default()
        }
    }

    /// Record `source` as the active one and return the same data bag bound
    /// to it.
    pub(crate) fn for_run(&self, source: CancellationSource) -> Self {
        match self.active.write() {
            Ok(mut active) => *active = source.clone(),
            Err(poisoned) => *poisoned.into_inner() = source.clone(),
        }
        Self {
            data: Arc::clone(&self.data),
            active: Arc::clone(&self.active),
            bound: Some(source),
        }
    }

    /// The cancellation source of the run this context belongs to. On the
    /// workflow's own context this is the source of the latest run.
    pub fn cancellation_source(&self) -> CancellationSource {
        if let Some(source) = &self.bound {
            return source.clone();
        }
        match self.active.read() {
            Ok(active) => active.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancellation_source().token()
    }

    /// Read and deserialize a value. `Ok(None)` when the key is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, WorkflowError> {
        match self.data.get(key) {
            Some(entry) => Ok(Some(serde_json::from_value(entry.value().clone())?)),
            None => Ok(None),
        }
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    /// Serialize and store a value, replacing any previous one.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<(), WorkflowError> {
        let value = serde_json::to_value(value)?;
        self.data.insert(key.into(), value);
        Ok(())
    }

    /// Mutate a value in place while holding its entry lock. Absent keys start
    /// as `Value::Null`.
    pub fn update<F>(&self, key: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Value),
    {
        let mut entry = self.data.entry(key.into()).or_insert(Value::Null);
        f(entry.value_mut());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Point-in-time copy of the data bag as a JSON object.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_and_get_typed_value() {
        let ctx = ExecutionContext::new();
        ctx.set("count", 3u32).unwrap();

        let count: Option<u32> = ctx.get("count").unwrap();
        assert_eq!(count, Some(3));
        assert!(ctx.contains_key("count"));
    }

    #[test]
    fn get_missing_key_is_none() {
        let ctx = ExecutionContext::new();
        let missing: Option<String> = ctx.get("nope").unwrap();
        assert!(missing.is_none());
        assert!(ctx.get_value("nope").is_none());
    }

    #[test]
    fn get_with_wrong_type_is_payload_error() {
        let ctx = ExecutionContext::new();
        ctx.set("name", "luna").unwrap();
        let result: Result<Option<u32>, _> = ctx.get("name");
        assert!(matches!(result, Err(WorkflowError::Payload(_))));
    }

    #[test]
    fn seeded_data_is_visible() {
        let ctx = ExecutionContext::with_data([("user", json!({"age": 22}))]);
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get_value("user").unwrap()["age"], 22);
    }

    #[test]
    fn update_mutates_in_place() {
        let ctx = ExecutionContext::new();
        for _ in 0..3 {
            ctx.update("hits", |v| {
                let n = v.as_u64().unwrap_or(0);
                *v = json!(n + 1);
            });
        }
        assert_eq!(ctx.get::<u64>("hits").unwrap(), Some(3));
    }

    #[test]
    fn remove_returns_previous_value() {
        let ctx = ExecutionContext::new();
        ctx.set("k", "v").unwrap();
        assert_eq!(ctx.remove("k"), Some(json!("v")));
        assert!(ctx.is_empty());
    }

    #[test]
    fn for_run_shares_data_and_records_the_active_source() {
        let ctx = ExecutionContext::new();
        let source = CancellationSource::new();
        let run_ctx = ctx.for_run(source.clone());

        run_ctx.set("written", true).unwrap();
        assert_eq!(ctx.get::<bool>("written").unwrap(), Some(true));

        ctx.cancellation_source().cancel();
        assert!(source.is_cancelled());
        assert!(run_ctx.token().is_cancelled());
    }

    #[test]
    fn run_contexts_keep_their_own_source() {
        let ctx = ExecutionContext::new();
        let first = ctx.for_run(CancellationSource::new());
        let second = ctx.for_run(CancellationSource::new());

        first.cancellation_source().cancel();
        assert!(first.token().is_cancelled());
        assert!(!second.token().is_cancelled());
        assert!(!ctx.token().is_cancelled());
    }

    #[test]
    fn snapshot_copies_all_entries() {
        let ctx = ExecutionContext::with_data([("a", json!(1)), ("b", json!("two"))]);
        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["b"], json!("two"));
    }
}
