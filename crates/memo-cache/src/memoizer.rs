//! Memoization engine

use crate::config::MemoConfig;
use crate::policy::{DecayPolicy, Lru, NoDecay, Tracking};
use memo_core::{
    CacheIdentity, CallKey, Function, FunctionId, Invocable, KeyCanonicalizer, LocalStore,
    MemoError, Result, ResultStore,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Failure of a memoized call to a fallible function
#[derive(Error, Debug)]
pub enum CallError<E> {
    /// The function itself returned an error; never cached
    #[error("Function error: {0}")]
    Function(E),

    /// Keying, storing or bookkeeping failed
    #[error(transparent)]
    Cache(#[from] MemoError),
}

impl<E> CallError<E> {
    pub fn is_cache_error(&self) -> bool {
        matches!(self, CallError::Cache(_))
    }

    pub fn into_function_error(self) -> Option<E> {
        match self {
            CallError::Function(err) => Some(err),
            CallError::Cache(_) => None,
        }
    }
}

struct CacheState<S, P> {
    store: S,
    policy: P,
}

/// Caches results of idempotent functions keyed by their arguments
///
/// The store and the decay policy live behind one lock. The memoized
/// function runs outside it, so two concurrent misses on the same key may
/// both invoke the function; the later write wins.
pub struct Memoizer<S = LocalStore, P = NoDecay> {
    config: MemoConfig,
    canonicalizer: KeyCanonicalizer,
    state: Mutex<CacheState<S, P>>,
}

impl Memoizer {
    /// Local, unbounded memoizer with default configuration
    pub fn new() -> Self {
        Self::with_config(MemoConfig::default())
    }

    pub fn with_config(config: MemoConfig) -> Self {
        Self::from_parts(config, LocalStore::new(), NoDecay)
    }
}

impl Default for Memoizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Memoizer<LocalStore, Tracking> {
    /// Local memoizer that counts hits and misses
    pub fn tracking() -> Self {
        Self::from_parts(MemoConfig::default(), LocalStore::new(), Tracking::new())
    }
}

impl Memoizer<LocalStore, Lru> {
    /// Local memoizer holding at most `capacity` results
    pub fn lru(capacity: usize) -> Result<Self> {
        Ok(Self::from_parts(
            MemoConfig::default(),
            LocalStore::new(),
            Lru::new(capacity)?,
        ))
    }
}

impl<S: ResultStore, P: DecayPolicy> Memoizer<S, P> {
    pub fn from_parts(config: MemoConfig, store: S, policy: P) -> Self {
        Self {
            canonicalizer: config.canonicalizer(),
            config,
            state: Mutex::new(CacheState { store, policy }),
        }
    }

    pub fn config(&self) -> &MemoConfig {
        &self.config
    }

    /// Key `args` would be cached under
    pub fn canonicalize<A: Serialize + ?Sized>(&self, args: &A) -> Result<CallKey> {
        self.canonicalizer.canonicalize(args)
    }

    /// Return the cached result of `function(args)`, computing and caching
    /// it on a miss.
    ///
    /// `function` must be idempotent; cached results are never revalidated.
    pub fn get_result<A, R, F>(&self, function: &F, args: A) -> Result<R>
    where
        F: Invocable<A, R> + ?Sized,
        A: Serialize,
        R: Serialize + DeserializeOwned,
    {
        match self.resolve(function.partition(), args, |args| {
            Ok::<R, Infallible>(function.invoke(args))
        }) {
            Ok(value) => Ok(value),
            Err(CallError::Cache(err)) => Err(err),
            Err(CallError::Function(never)) => match never {},
        }
    }

    /// Like [`get_result`](Self::get_result) for functions returning
    /// `Result`. Only `Ok` values are cached; errors are handed back as
    /// [`CallError::Function`].
    pub fn try_get_result<A, T, E, F>(
        &self,
        function: &F,
        args: A,
    ) -> std::result::Result<T, CallError<E>>
    where
        F: Invocable<A, std::result::Result<T, E>> + ?Sized,
        A: Serialize,
        T: Serialize + DeserializeOwned,
    {
        self.resolve(function.partition(), args, |args| function.invoke(args))
    }

    fn resolve<A, T, E>(
        &self,
        partition: &FunctionId,
        args: A,
        compute: impl FnOnce(A) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, CallError<E>>
    where
        A: Serialize,
        T: Serialize + DeserializeOwned,
    {
        let key = self.canonicalizer.canonicalize(&args)?;

        match self.cached(partition, &key) {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(err) if self.config.resilient => {
                error!(
                    function = %partition,
                    error = %err,
                    "Cache lookup failed, calling function directly"
                );
                return compute(args).map_err(CallError::Function);
            }
            Err(err) => return Err(err.into()),
        }

        let result = compute(args).map_err(CallError::Function)?;

        if let Err(err) = self.store_result(partition, key, &result) {
            if !self.config.resilient {
                return Err(err.into());
            }
            error!(
                function = %partition,
                error = %err,
                "Failed to cache result, returning it uncached"
            );
        }
        Ok(result)
    }

    /// Look `key` up and, on a hit, decode it and fire `decay(hit)`
    fn cached<T: DeserializeOwned>(
        &self,
        partition: &FunctionId,
        key: &CallKey,
    ) -> Result<Option<T>> {
        let mut guard = self.state.lock();
        let CacheState { store, policy } = &mut *guard;

        let Some(stored) = store.lookup(partition, key)? else {
            return Ok(None);
        };
        let value = serde_json::from_value(stored).map_err(|source| MemoError::Decode {
            function: partition.name().to_string(),
            source,
        })?;
        policy.decay(store, partition, key, true)?;
        Ok(Some(value))
    }

    /// Store a fresh result and fire `decay(miss)`
    fn store_result<T: Serialize>(
        &self,
        partition: &FunctionId,
        key: CallKey,
        result: &T,
    ) -> Result<()> {
        let value = serde_json::to_value(result)?;

        let mut guard = self.state.lock();
        let CacheState { store, policy } = &mut *guard;
        store.insert(partition, key.clone(), value)?;
        policy.decay(store, partition, &key, false)
    }

    /// Remove one cached entry (`params`) or a function's whole sub-cache.
    ///
    /// The given identity is tried first, then the function it wraps.
    /// Removing something that is not cached is a no-op returning `false`.
    pub fn remove_from_cache(
        &self,
        function: &dyn CacheIdentity,
        params: Option<&CallKey>,
    ) -> Result<bool> {
        let mut guard = self.state.lock();
        let CacheState { store, policy } = &mut *guard;

        // The policy tracks entries under the partition they were stored in
        policy.forget(function.partition(), params);

        let candidates = std::iter::once(function.cache_id()).chain(function.unwrapped_id());
        for id in candidates {
            let removed = match params {
                Some(key) => store.remove_entry(id, key)?,
                None => store.remove_function(id)?,
            };
            if removed {
                debug!(function = %id, key = ?params.map(CallKey::as_str), "Removed from cache");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove the entry for one argument set
    pub fn remove_call<A: Serialize + ?Sized>(
        &self,
        function: &dyn CacheIdentity,
        args: &A,
    ) -> Result<bool> {
        let key = self.canonicalize(args)?;
        self.remove_from_cache(function, Some(&key))
    }

    /// Whether `function(args)` is cached. Does not count as an access.
    pub fn is_cached<A: Serialize + ?Sized>(
        &self,
        function: &dyn CacheIdentity,
        args: &A,
    ) -> Result<bool> {
        let key = self.canonicalize(args)?;
        let mut guard = self.state.lock();
        Ok(guard.store.lookup(function.partition(), &key)?.is_some())
    }

    /// Number of cached results for `function`
    pub fn cached_len(&self, function: &dyn CacheIdentity) -> Result<usize> {
        self.state.lock().store.entry_count(function.partition())
    }

    /// Run `f` against the store while holding the engine lock
    pub fn with_store<T>(&self, f: impl FnOnce(&mut S) -> T) -> T {
        f(&mut self.state.lock().store)
    }

    /// Run `f` against the decay policy while holding the engine lock
    pub fn with_policy<T>(&self, f: impl FnOnce(&P) -> T) -> T {
        f(&self.state.lock().policy)
    }

    /// Wrap `function` so every call goes through this memoizer
    pub fn memoize<A, R>(self: &Arc<Self>, function: Function<A, R>) -> Memoized<A, R, S, P> {
        Memoized {
            id: FunctionId::new(function.name()),
            wrapped: function,
            memoizer: Arc::clone(self),
        }
    }
}

impl<S: ResultStore> Memoizer<S, Tracking> {
    /// `(hits, misses)` for one function, or totals when `function` is `None`
    pub fn get_counts(&self, function: Option<&dyn CacheIdentity>) -> (u64, u64) {
        let guard = self.state.lock();
        guard.policy.counts(function.map(|f| f.partition()))
    }
}

impl<S: ResultStore> Memoizer<S, Lru> {
    /// Number of entries evicted by the recency bound
    pub fn evictions(&self) -> u64 {
        self.state.lock().policy.evictions()
    }
}

impl<S, P> fmt::Debug for Memoizer<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("config", &self.config)
            .field("store", &std::any::type_name::<S>())
            .field("policy", &std::any::type_name::<P>())
            .finish()
    }
}

/// A function whose calls are routed through a [`Memoizer`]
///
/// The wrapper has its own identity but keeps the original in `wrapped`;
/// results are cached under the original's partition, so the cache can be
/// cleared through either.
pub struct Memoized<A, R, S = LocalStore, P = NoDecay> {
    id: FunctionId,
    wrapped: Function<A, R>,
    memoizer: Arc<Memoizer<S, P>>,
}

impl<A, R, S, P> Memoized<A, R, S, P> {
    pub fn id(&self) -> &FunctionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    /// The unwrapped function
    pub fn wrapped(&self) -> &Function<A, R> {
        &self.wrapped
    }

    pub fn memoizer(&self) -> &Arc<Memoizer<S, P>> {
        &self.memoizer
    }
}

impl<A, R, S, P> Memoized<A, R, S, P>
where
    A: Serialize,
    R: Serialize + DeserializeOwned,
    S: ResultStore,
    P: DecayPolicy,
{
    pub fn call(&self, args: A) -> Result<R> {
        self.memoizer.get_result(self, args)
    }
}

impl<A, T, E, S, P> Memoized<A, std::result::Result<T, E>, S, P>
where
    A: Serialize,
    T: Serialize + DeserializeOwned,
    S: ResultStore,
    P: DecayPolicy,
{
    /// Call a fallible function; errors are returned and not cached
    pub fn try_call(&self, args: A) -> std::result::Result<T, CallError<E>> {
        self.memoizer.try_get_result(self, args)
    }
}

impl<A, R, S, P> CacheIdentity for Memoized<A, R, S, P> {
    fn cache_id(&self) -> &FunctionId {
        &self.id
    }

    fn unwrapped_id(&self) -> Option<&FunctionId> {
        Some(self.wrapped.id())
    }
}

impl<A, R, S, P> Invocable<A, R> for Memoized<A, R, S, P> {
    fn invoke(&self, args: A) -> R {
        self.wrapped.call(args)
    }
}

impl<A, R, S, P> Clone for Memoized<A, R, S, P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            wrapped: self.wrapped.clone(),
            memoizer: Arc::clone(&self.memoizer),
        }
    }
}

impl<A, R, S, P> fmt::Debug for Memoized<A, R, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("id", &self.id)
            .field("wrapped", &self.wrapped.id())
            .finish()
    }
}
