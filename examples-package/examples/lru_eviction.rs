//! LRU Eviction Example
//!
//! A memoizer bounded to two entries shared by every function it serves.

use anyhow::Result;
use memo_cache::Memoizer;
use memo_core::Function;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

fn main() -> Result<()> {
    init_logging();
    println!("=== LRU Eviction Example ===\n");

    let memoizer = Arc::new(Memoizer::lru(2)?);
    let square = memoizer.memoize(Function::new("demo::square", |v: u64| v * v));

    square.call(1)?;
    square.call(2)?;
    println!("cached after 1, 2: {}", memoizer.cached_len(&square)?);

    // Touching 1 protects it; 2 is now the least recently used
    square.call(1)?;
    square.call(3)?;

    for v in [1, 2, 3] {
        println!("square({}) cached: {}", v, memoizer.is_cached(&square, &v)?);
    }
    println!("evictions: {}", memoizer.evictions());

    memoizer.with_policy(|policy| {
        println!("\nrecency order (oldest first):");
        for (function, key) in policy.order() {
            println!("  {} {}", function, key);
        }
    });
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,memo_cache=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
