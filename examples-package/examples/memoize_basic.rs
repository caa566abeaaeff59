//! Basic Memoization Example
//!
//! Wraps a function, shows hits and misses with the tracking policy and
//! removes entries again.

use anyhow::Result;
use memo_cache::Memoizer;
use memo_core::{function, kwargs, Function, Kwargs};
use std::sync::Arc;
use tracing_subscriber::prelude::*;

fn add_two(v: i64) -> i64 {
    println!("  (computing add_two({}))", v);
    v + 2
}

fn main() -> Result<()> {
    init_logging();
    println!("=== Basic Memoization Example ===\n");

    let memoizer = Arc::new(Memoizer::tracking());

    // Example 1: wrapped function
    println!("--- Example 1: Wrapped Function ---\n");
    let cached_add_two = memoizer.memoize(function!(add_two));
    for v in [5, 5, 6, 5] {
        println!("add_two({}) = {}", v, cached_add_two.call(v)?);
    }
    let (hits, misses) = memoizer.get_counts(Some(&cached_add_two));
    println!("\nhits: {}, misses: {}\n", hits, misses);

    // Example 2: keyword arguments in any order
    println!("--- Example 2: Keyword Arguments ---\n");
    let area = Function::new("demo::area", |(scale, dims): (f64, Kwargs<f64>)| {
        let width = dims.get("width").copied().unwrap_or(0.0);
        let height = dims.get("height").copied().unwrap_or(0.0);
        scale * width * height
    });
    let first = memoizer.get_result(&area, (2.0, kwargs! { "width" => 3.0, "height" => 4.0 }))?;
    let second = memoizer.get_result(&area, (2.0, kwargs! { "height" => 4.0, "width" => 3.0 }))?;
    println!("area = {} then {}", first, second);
    println!("area counts: {:?}\n", memoizer.get_counts(Some(&area)));

    // Example 3: removal
    println!("--- Example 3: Removal ---\n");
    println!("removed add_two(5): {}", memoizer.remove_call(&cached_add_two, &5)?);
    println!("removed add_two(5) again: {}", memoizer.remove_call(&cached_add_two, &5)?);
    println!("add_two(5) = {}", cached_add_two.call(5)?);
    println!("removed all of add_two: {}", memoizer.remove_from_cache(&cached_add_two, None)?);

    let (hits, misses) = memoizer.get_counts(None);
    println!("\ntotal hits: {}, total misses: {}", hits, misses);
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
