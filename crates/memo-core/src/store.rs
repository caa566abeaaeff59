//! Result stores
//!
//! The engine talks to its store through [`ResultStore`]. The local store
//! mutates per-function maps in place; remote stores are free to implement
//! the same contract with whole-snapshot read-modify-write.

use crate::error::Result;
use crate::function::FunctionId;
use crate::key::CallKey;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// All cached results of one function, keyed by call
pub type SubCache = BTreeMap<CallKey, Value>;

/// Storage contract used by the memoization engine
pub trait ResultStore: Send {
    /// Fetch the cached result for `key`, if any
    fn lookup(&mut self, function: &FunctionId, key: &CallKey) -> Result<Option<Value>>;

    /// Store `value` under `key`, creating the function's sub-cache if needed
    fn insert(&mut self, function: &FunctionId, key: CallKey, value: Value) -> Result<()>;

    /// Remove one entry. Returns whether it existed.
    fn remove_entry(&mut self, function: &FunctionId, key: &CallKey) -> Result<bool>;

    /// Remove a function's whole sub-cache. Returns whether it existed.
    fn remove_function(&mut self, function: &FunctionId) -> Result<bool>;

    /// Number of cached entries for `function`
    fn entry_count(&mut self, function: &FunctionId) -> Result<usize>;
}

/// In-memory, single-process store
#[derive(Debug, Default)]
pub struct LocalStore {
    functions: HashMap<FunctionId, SubCache>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of functions with a sub-cache
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Total entries across all functions
    pub fn len(&self) -> usize {
        self.functions.values().map(|sub| sub.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sub_cache(&self, function: &FunctionId) -> Option<&SubCache> {
        self.functions.get(function)
    }

    pub fn clear(&mut self) {
        self.functions.clear();
    }
}

impl ResultStore for LocalStore {
    fn lookup(&mut self, function: &FunctionId, key: &CallKey) -> Result<Option<Value>> {
        Ok(self
            .functions
            .get(function)
            .and_then(|sub| sub.get(key))
            .cloned())
    }

    fn insert(&mut self, function: &FunctionId, key: CallKey, value: Value) -> Result<()> {
        self.functions
            .entry(function.clone())
            .or_default()
            .insert(key, value);
        Ok(())
    }

    fn remove_entry(&mut self, function: &FunctionId, key: &CallKey) -> Result<bool> {
        Ok(self
            .functions
            .get_mut(function)
            .map(|sub| sub.remove(key).is_some())
            .unwrap_or(false))
    }

    fn remove_function(&mut self, function: &FunctionId) -> Result<bool> {
        Ok(self.functions.remove(function).is_some())
    }

    fn entry_count(&mut self, function: &FunctionId) -> Result<usize> {
        Ok(self.functions.get(function).map(|sub| sub.len()).unwrap_or(0))
    }
}
