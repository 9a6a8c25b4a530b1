//! Mem Cache demo
//!
//! Walks a cache through its lifecycle and prints the resulting statistics.

use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mem_cache::{Cache, CacheConfig};

/// Demo entry point.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Exercise set/get/expiry/delete/clear against a live cache
/// 4. Print the statistics snapshot as JSON and tear the cache down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mem_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: ttl={:?}, check_period={:?}",
        config.ttl, config.check_period
    );

    let cache: Cache<String, String> =
        Cache::new(config).context("Failed to create cache")?;

    info!("get(foo) -> {:?}", cache.get("foo"));

    cache.set("foo".to_string(), "bar".to_string());
    info!("has(foo) -> {}", cache.has("foo"));
    info!("get(foo) -> {:?}", cache.get("foo"));

    cache.set_with_callback(
        "short".to_string(),
        "lived".to_string(),
        Some(Duration::from_millis(50)),
        |value| info!("Entry expired with value {:?}", value),
    )?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("has(short) -> {}", cache.has("short"));

    cache
        .set("foo2".to_string(), "baz".to_string())
        .set("foo3".to_string(), "bay".to_string());
    cache.delete("foo2");
    info!("size -> {}", cache.size());

    let stats = serde_json::to_string(&cache.stats()).context("Failed to serialize stats")?;
    println!("{stats}");

    cache.clear();
    info!("size after clear -> {}", cache.size());

    cache.close();
    info!("Cache closed");
    Ok(())
}
