//! Shared memoization cache for rememo
//!
//! Processes that point at the same address and secret share one cache.
//! The first to bind the address becomes the host and keeps the map; the
//! others proxy every operation to it. When the host goes away, the next
//! node to notice re-runs the election and either takes over as host
//! (starting from an empty map) or reconnects to whoever did.
//!
//! # Example
//!
//! ```no_run
//! use memo_core::Function;
//! use memo_distributed::{shared_memoizer, DistributedConfig};
//! use std::sync::Arc;
//!
//! let config = DistributedConfig::default().with_secret("s3cret");
//! let memoizer = Arc::new(shared_memoizer(config)?);
//! let add_two = memoizer.memoize(Function::new("demo::add_two", |v: i64| v + 2));
//! assert_eq!(add_two.call(5)?, 7);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod network;
pub mod node;
pub mod store;
pub mod types;

pub use client::CacheClient;
pub use config::{DistributedConfig, DEFAULT_MAX_FRAME_BYTES};
pub use error::{DistributedError, Result};
pub use host::CacheHost;
pub use network::{Request, Response};
pub use node::{CacheNode, NodeRole};
pub use store::{qualified_name, DistributedStore, KeySerializer};
pub use types::NodeId;

use memo_cache::{MemoConfig, Memoizer, NoDecay};

/// Memoizer backed by the shared cache
pub type SharedMemoizer<P = NoDecay> = Memoizer<DistributedStore, P>;

/// Join the cache at `config` and build a memoizer with default settings
pub fn shared_memoizer(config: DistributedConfig) -> Result<SharedMemoizer> {
    let store = DistributedStore::connect(config)?;
    Ok(Memoizer::from_parts(MemoConfig::default(), store, NoDecay))
}
