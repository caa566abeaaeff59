//! Decay policies
//!
//! A policy is injected into the engine at construction and is called after
//! every lookup while the engine still holds the lock guarding the store, so
//! any eviction it performs is atomic with the bookkeeping that caused it.

use crate::stats::CallCounts;
use lru::LruCache;
use memo_core::{CallKey, FunctionId, MemoError, Result, ResultStore};
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use tracing::debug;

/// Default number of entries kept by [`Lru`]
pub const DEFAULT_LRU_CAPACITY: usize = 100;

/// Hook invoked on every cache access
pub trait DecayPolicy: Send {
    /// Called after each lookup of `key` in `function`'s sub-cache
    fn decay(
        &mut self,
        store: &mut dyn ResultStore,
        function: &FunctionId,
        key: &CallKey,
        was_hit: bool,
    ) -> Result<()>;

    /// Called when entries are removed explicitly. `None` means the whole
    /// sub-cache of `function` is gone.
    fn forget(&mut self, _function: &FunctionId, _key: Option<&CallKey>) {}
}

/// Does nothing; the store grows without bound
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecay;

impl DecayPolicy for NoDecay {
    fn decay(
        &mut self,
        _store: &mut dyn ResultStore,
        _function: &FunctionId,
        _key: &CallKey,
        _was_hit: bool,
    ) -> Result<()> {
        Ok(())
    }
}

/// Counts hits and misses globally and per function. Never evicts.
#[derive(Debug, Default, Clone)]
pub struct Tracking {
    totals: CallCounts,
    by_function: HashMap<FunctionId, CallCounts>,
}

impl Tracking {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(hits, misses)` for `function`, or across all functions when `None`.
    /// Functions never seen report `(0, 0)`.
    pub fn counts(&self, function: Option<&FunctionId>) -> (u64, u64) {
        match function {
            Some(function) => self.function_counts(function).as_tuple(),
            None => self.totals.as_tuple(),
        }
    }

    pub fn totals(&self) -> CallCounts {
        self.totals
    }

    pub fn function_counts(&self, function: &FunctionId) -> CallCounts {
        self.by_function.get(function).copied().unwrap_or_default()
    }

    /// Functions with at least one recorded lookup
    pub fn functions(&self) -> impl Iterator<Item = (&FunctionId, &CallCounts)> {
        self.by_function.iter()
    }
}

impl DecayPolicy for Tracking {
    fn decay(
        &mut self,
        _store: &mut dyn ResultStore,
        function: &FunctionId,
        _key: &CallKey,
        was_hit: bool,
    ) -> Result<()> {
        self.totals.record(was_hit);
        self.by_function
            .entry(function.clone())
            .or_default()
            .record(was_hit);
        Ok(())
    }
}

/// Bounded recency queue over all functions
///
/// Hits move the pair to the most-recently-used end, misses append it. Once
/// the queue holds more than `capacity` pairs the least recently used one is
/// dropped from the queue and deleted from the store.
///
/// A pair whose store deletion fails stays pending and is retried before the
/// next access is recorded, so the store returns to `capacity` entries once
/// it recovers.
#[derive(Debug)]
pub struct Lru {
    queue: LruCache<(FunctionId, CallKey), ()>,
    pending: VecDeque<(FunctionId, CallKey)>,
    evictions: u64,
}

impl Lru {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| MemoError::Config("LRU capacity must be > 0".into()))?;
        Ok(Self::with_capacity(capacity))
    }

    fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            queue: LruCache::new(capacity),
            pending: VecDeque::new(),
            evictions: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.queue.cap().get()
    }

    /// Number of tracked pairs
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Evicted pairs whose store deletion has not succeeded yet
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of entries evicted so far
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn contains(&self, function: &FunctionId, key: &CallKey) -> bool {
        self.queue.contains(&(function.clone(), key.clone()))
    }

    /// Tracked pairs from least to most recently used
    pub fn order(&self) -> Vec<(FunctionId, CallKey)> {
        self.queue.iter().rev().map(|(pair, _)| pair.clone()).collect()
    }
}

impl Default for Lru {
    fn default() -> Self {
        let capacity = NonZeroUsize::new(DEFAULT_LRU_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self::with_capacity(capacity)
    }
}

impl Lru {
    /// Delete pending pairs from the store, oldest first. Stops at the first
    /// failure, leaving that pair and the rest queued.
    fn flush_pending(&mut self, store: &mut dyn ResultStore) -> Result<()> {
        while let Some((function, key)) = self.pending.front() {
            let removed = store.remove_entry(function, key)?;
            if removed {
                self.evictions += 1;
                debug!(
                    function = %function,
                    key = %key,
                    "Evicted least recently used entry"
                );
            }
            self.pending.pop_front();
        }
        Ok(())
    }
}

impl DecayPolicy for Lru {
    fn decay(
        &mut self,
        store: &mut dyn ResultStore,
        function: &FunctionId,
        key: &CallKey,
        was_hit: bool,
    ) -> Result<()> {
        self.flush_pending(store)?;
        let pair = (function.clone(), key.clone());

        // A hit on an untracked pair (written by another node) counts as new
        if was_hit && self.queue.get(&pair).is_some() {
            return Ok(());
        }

        match self.queue.push(pair, ()) {
            Some((evicted, ())) if evicted.0 != *function || evicted.1 != *key => {
                self.pending.push_back(evicted);
                self.flush_pending(store)
            }
            _ => Ok(()),
        }
    }

    fn forget(&mut self, function: &FunctionId, key: Option<&CallKey>) {
        self.pending.retain(|(pending, pending_key)| {
            pending != function || key.is_some_and(|key| key != pending_key)
        });
        match key {
            Some(key) => {
                self.queue.pop(&(function.clone(), key.clone()));
            }
            None => {
                let stale: Vec<(FunctionId, CallKey)> = self
                    .queue
                    .iter()
                    .filter(|(pair, _)| pair.0 == *function)
                    .map(|(pair, _)| pair.clone())
                    .collect();
                for pair in stale {
                    self.queue.pop(&pair);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_core::LocalStore;
    use serde_json::{json, Value};

    fn key(n: i64) -> CallKey {
        CallKey::from_raw(format!("[{}]", n))
    }

    /// Simulate an engine miss: store the value, then decay
    fn miss(policy: &mut impl DecayPolicy, store: &mut LocalStore, f: &FunctionId, n: i64) {
        store.insert(f, key(n), json!(n)).unwrap();
        policy.decay(store, f, &key(n), false).unwrap();
    }

    #[test]
    fn test_no_decay_keeps_everything() {
        let mut store = LocalStore::new();
        let mut policy = NoDecay;
        let f = FunctionId::new("f");
        for n in 0..500 {
            miss(&mut policy, &mut store, &f, n);
        }
        assert_eq!(store.len(), 500);
    }

    #[test]
    fn test_tracking_counts() {
        let mut store = LocalStore::new();
        let mut policy = Tracking::new();
        let f = FunctionId::new("f");
        let g = FunctionId::new("g");

        miss(&mut policy, &mut store, &f, 1);
        policy.decay(&mut store, &f, &key(1), true).unwrap();
        policy.decay(&mut store, &f, &key(1), true).unwrap();
        miss(&mut policy, &mut store, &g, 1);

        assert_eq!(policy.counts(Some(&f)), (2, 1));
        assert_eq!(policy.counts(Some(&g)), (0, 1));
        assert_eq!(policy.counts(None), (2, 2));
        assert_eq!(policy.counts(Some(&FunctionId::new("h"))), (0, 0));

        let summed = policy
            .functions()
            .fold(CallCounts::new(), |acc, (_, counts)| acc + *counts);
        assert_eq!(summed, policy.totals());
    }

    #[test]
    fn test_lru_rejects_zero_capacity() {
        assert!(matches!(Lru::new(0), Err(MemoError::Config(_))));
        assert_eq!(Lru::default().capacity(), DEFAULT_LRU_CAPACITY);
    }

    #[test]
    fn test_lru_evicts_least_recent() {
        let mut store = LocalStore::new();
        let mut policy = Lru::new(2).unwrap();
        let f = FunctionId::new("f");

        miss(&mut policy, &mut store, &f, 1);
        miss(&mut policy, &mut store, &f, 2);
        miss(&mut policy, &mut store, &f, 3);

        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup(&f, &key(1)).unwrap(), None);
        assert!(store.lookup(&f, &key(2)).unwrap().is_some());
        assert!(store.lookup(&f, &key(3)).unwrap().is_some());
        assert_eq!(policy.evictions(), 1);
    }

    #[test]
    fn test_lru_hit_protects_entry() {
        let mut store = LocalStore::new();
        let mut policy = Lru::new(2).unwrap();
        let f = FunctionId::new("f");

        miss(&mut policy, &mut store, &f, 1);
        miss(&mut policy, &mut store, &f, 2);
        policy.decay(&mut store, &f, &key(1), true).unwrap();
        miss(&mut policy, &mut store, &f, 3);

        assert!(store.lookup(&f, &key(1)).unwrap().is_some());
        assert_eq!(store.lookup(&f, &key(2)).unwrap(), None);
        assert_eq!(policy.order(), vec![(f.clone(), key(1)), (f, key(3))]);
    }

    #[test]
    fn test_lru_spans_functions() {
        let mut store = LocalStore::new();
        let mut policy = Lru::new(2).unwrap();
        let f = FunctionId::new("f");
        let g = FunctionId::new("g");

        miss(&mut policy, &mut store, &f, 1);
        miss(&mut policy, &mut store, &g, 1);
        miss(&mut policy, &mut store, &g, 2);

        assert_eq!(store.entry_count(&f).unwrap(), 0);
        assert_eq!(store.entry_count(&g).unwrap(), 2);
    }

    /// Local store whose next `failures` removals fail
    struct FlakyStore {
        inner: LocalStore,
        failures: usize,
    }

    impl ResultStore for FlakyStore {
        fn lookup(&mut self, function: &FunctionId, key: &CallKey) -> Result<Option<Value>> {
            self.inner.lookup(function, key)
        }
        fn insert(&mut self, function: &FunctionId, key: CallKey, value: Value) -> Result<()> {
            self.inner.insert(function, key, value)
        }
        fn remove_entry(&mut self, function: &FunctionId, key: &CallKey) -> Result<bool> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(MemoError::store(std::io::Error::other("host unreachable")));
            }
            self.inner.remove_entry(function, key)
        }
        fn remove_function(&mut self, function: &FunctionId) -> Result<bool> {
            self.inner.remove_function(function)
        }
        fn entry_count(&mut self, function: &FunctionId) -> Result<usize> {
            self.inner.entry_count(function)
        }
    }

    #[test]
    fn test_lru_failed_eviction_is_retried() {
        let mut store = FlakyStore {
            inner: LocalStore::new(),
            failures: 0,
        };
        let mut policy = Lru::new(2).unwrap();
        let f = FunctionId::new("f");

        for n in 1..=2 {
            store.insert(&f, key(n), json!(n)).unwrap();
            policy.decay(&mut store, &f, &key(n), false).unwrap();
        }

        store.failures = 1;
        store.insert(&f, key(3), json!(3)).unwrap();
        assert!(policy.decay(&mut store, &f, &key(3), false).is_err());
        assert_eq!(store.inner.len(), 3);
        assert_eq!(policy.pending_len(), 1);
        assert!(policy.contains(&f, &key(3)));

        for n in 4..=10 {
            store.insert(&f, key(n), json!(n)).unwrap();
            policy.decay(&mut store, &f, &key(n), false).unwrap();
        }

        assert_eq!(store.inner.len(), 2);
        assert_eq!(policy.len(), 2);
        assert_eq!(policy.pending_len(), 0);
        assert_eq!(policy.evictions(), 8);
    }

    #[test]
    fn test_lru_forget_drops_pending_eviction() {
        let mut store = FlakyStore {
            inner: LocalStore::new(),
            failures: 1,
        };
        let mut policy = Lru::new(1).unwrap();
        let f = FunctionId::new("f");

        store.insert(&f, key(1), json!(1)).unwrap();
        policy.decay(&mut store, &f, &key(1), false).unwrap();
        store.insert(&f, key(2), json!(2)).unwrap();
        assert!(policy.decay(&mut store, &f, &key(2), false).is_err());
        assert_eq!(policy.pending_len(), 1);

        policy.forget(&f, Some(&key(1)));
        assert_eq!(policy.pending_len(), 0);
        assert!(policy.contains(&f, &key(2)));
    }

    #[test]
    fn test_lru_only_counts_real_evictions() {
        let mut store = LocalStore::new();
        let mut policy = Lru::new(1).unwrap();
        let f = FunctionId::new("f");

        miss(&mut policy, &mut store, &f, 1);
        // Removed behind the policy's back
        store.remove_entry(&f, &key(1)).unwrap();
        miss(&mut policy, &mut store, &f, 2);

        assert_eq!(policy.evictions(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_lru_forget() {
        let mut store = LocalStore::new();
        let mut policy = Lru::new(10).unwrap();
        let f = FunctionId::new("f");
        let g = FunctionId::new("g");

        miss(&mut policy, &mut store, &f, 1);
        miss(&mut policy, &mut store, &f, 2);
        miss(&mut policy, &mut store, &g, 1);

        policy.forget(&f, Some(&key(1)));
        assert!(!policy.contains(&f, &key(1)));
        assert_eq!(policy.len(), 2);

        policy.forget(&f, None);
        assert_eq!(policy.len(), 1);
        assert!(policy.contains(&g, &key(1)));
    }
}
