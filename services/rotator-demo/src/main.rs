//! Key rotator demo
//!
//! Loads a pool definition from TOML and walks through the pool's features:
//! 1. Round-robin rotation over the configured keys, with a manual expiry
//! 2. TTL-based expiry
//! 3. Replenishment through a key fetcher
//! 4. Retrying a failing call with fresh keys
//! 5. Concurrent access from many tasks
//! 6. A complete workflow combining TTL, fetcher and manual changes
//! 7. Auto-removal of expired keys
//!
//! Logs go to stderr as JSON; the final pool stats and Prometheus metrics
//! are printed to stdout.

mod config;
mod error;
mod metrics;
mod scenarios;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use key_pool::KeyPool;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, PoolConfig};

/// TTL used by the TTL walkthrough; short so the demo finishes quickly.
const DEMO_TTL: Duration = Duration::from_secs(2);

/// Tasks spawned by the concurrency walkthrough.
const CONCURRENT_WORKERS: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    info!("starting key-rotator-demo");

    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        keys = config.pool.keys.len(),
        ttl_secs = config.pool.ttl_secs,
        auto_remove_expired = config.pool.auto_remove_expired,
        max_retries = config.retry.max_retries,
        "configuration loaded"
    );

    let pool = build_pool(&config.pool).context("invalid pool configuration")?;
    let dispensed = scenarios::basic_rotation(&pool)
        .await
        .context("basic rotation failed")?;
    info!(
        dispensed = dispensed.len(),
        "scenario complete: basic rotation"
    );

    let (before, err) = scenarios::ttl_expiry(DEMO_TTL)
        .await
        .context("TTL walkthrough failed")?;
    info!(dispensed = before.len(), error = %err, "scenario complete: TTL expiry");

    let (fetched, stats) = scenarios::dynamic_fetching()
        .await
        .context("dynamic fetching failed")?;
    info!(
        key = %common::key_hint(&fetched),
        stats = %stats,
        "scenario complete: dynamic fetching"
    );

    let (result, calls, stats) = scenarios::retry_wrapper(config.retry.max_retries, 2)
        .await
        .context("retry walkthrough failed")?;
    match result {
        Ok(body) => info!(
            calls,
            body = %body,
            stats = %stats,
            "scenario complete: retry succeeded"
        ),
        Err(e) => error!(
            calls,
            error = %e,
            stats = %stats,
            "scenario complete: all retries failed"
        ),
    }

    let shared = Arc::new(build_pool(&config.pool).context("invalid pool configuration")?);
    let tally = scenarios::concurrent_access(shared.clone(), CONCURRENT_WORKERS)
        .await
        .context("concurrent walkthrough failed")?;
    info!(
        workers = CONCURRENT_WORKERS,
        distinct_keys = tally.len(),
        "scenario complete: concurrent access"
    );

    let stats = scenarios::complete_workflow()
        .await
        .context("complete workflow failed")?;
    info!(stats = %stats, "scenario complete: complete workflow");

    let remaining = scenarios::auto_remove()
        .await
        .context("auto-remove walkthrough failed")?;
    info!(
        remaining = remaining.len(),
        "scenario complete: auto-remove"
    );

    let final_stats = shared.stats().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&final_stats).context("failed to serialize pool stats")?
    );
    println!("{}", prometheus_handle.render());

    info!("all scenarios completed");
    Ok(())
}

/// Build a pool from the configured keys and policies.
fn build_pool(config: &PoolConfig) -> key_pool::Result<KeyPool> {
    let mut builder =
        KeyPool::builder(config.key_strings()).auto_remove_expired(config.auto_remove_expired);
    if let Some(ttl) = config.ttl() {
        builder = builder.ttl(ttl);
    }
    builder.build()
}
