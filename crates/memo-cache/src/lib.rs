//! Memoization engine for rememo
//!
//! This crate caches the results of idempotent functions keyed by their
//! arguments.
//!
//! # Features
//!
//! - **Canonical keys**: arguments are serialized into a deterministic key,
//!   keyword order optionally normalized
//! - **Decay policies**: no-op, hit/miss tracking, or bounded LRU eviction,
//!   injected at construction
//! - **Wrappers**: [`Memoizer::memoize`] returns a callable that always goes
//!   through the cache and remembers the function it wraps
//! - **Resilience**: optionally downgrade store faults to uncached calls
//! - **Pluggable stores**: any [`memo_core::ResultStore`], local or remote
//!
//! # Example
//!
//! ```
//! use memo_cache::Memoizer;
//! use memo_core::Function;
//! use std::sync::Arc;
//!
//! let memoizer = Arc::new(Memoizer::lru(100)?);
//! let add_two = memoizer.memoize(Function::new("add_two", |v: i64| v + 2));
//!
//! assert_eq!(add_two.call(5)?, 7);
//! assert!(memoizer.is_cached(&add_two, &5)?);
//! # Ok::<(), memo_core::MemoError>(())
//! ```

pub mod config;
pub mod memoizer;
pub mod policy;
pub mod stats;

pub use config::MemoConfig;
pub use memoizer::{CallError, Memoized, Memoizer};
pub use policy::{DecayPolicy, Lru, NoDecay, Tracking, DEFAULT_LRU_CAPACITY};
pub use stats::CallCounts;
