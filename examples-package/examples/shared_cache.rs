//! Shared Cache Example
//!
//! Run several copies at once against the same address:
//!
//! ```text
//! cargo run --example shared_cache -- 50000 s3cret
//! ```
//!
//! The first copy becomes the host; later copies reuse its results. Stop
//! the host and the next copy to touch the cache takes over.

use anyhow::Result;
use memo_core::Function;
use memo_distributed::{shared_memoizer, DistributedConfig};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::prelude::*;

fn slow_fib(n: u64) -> u64 {
    thread::sleep(Duration::from_millis(200));
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        (a, b) = (b, a.wrapping_add(b));
    }
    a
}

fn main() -> Result<()> {
    init_logging();

    let mut args = std::env::args().skip(1);
    let mut config = DistributedConfig::default();
    if let Some(port) = args.next() {
        config.port = port.parse()?;
    }
    if let Some(secret) = args.next() {
        config.secret = secret;
    }

    let memoizer = Arc::new(shared_memoizer(config)?);
    let role = memoizer.with_store(|store| if store.node().is_host() { "host" } else { "client" });
    info!("Joined shared cache as {}", role);

    let fib = memoizer.memoize(Function::new("demo::slow_fib", slow_fib));
    for round in 0..5 {
        for n in [10, 20, 30] {
            println!("round {}: fib({}) = {}", round, n, fib.call(n)?);
        }
        thread::sleep(Duration::from_secs(1));
    }

    println!("\n{}", memoizer.with_store(|store| store.stringify())?);
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
