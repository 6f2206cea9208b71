//! Walkthroughs of the pool's features
//!
//! Each scenario builds its own pool, drives it and returns what happened so
//! `main` can log it and tests can assert on it.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, bail};
use key_pool::{Error, FetchError, KeyPool, KeyRetry, PoolStats, RetryError};
use tracing::info;

use crate::error::ApiError;

/// Upstream stand-in that rejects a fixed set of keys.
pub struct SimulatedApi {
    rejected: HashSet<String>,
    calls: AtomicUsize,
}

impl SimulatedApi {
    pub fn rejecting<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rejected: keys.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub async fn call(&self, endpoint: &str, api_key: &str) -> Result<String, ApiError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        info!(attempt, endpoint, key = %common::key_hint(api_key), "calling simulated API");
        if endpoint.is_empty() {
            return Err(ApiError::BadRequest("empty endpoint".into()));
        }
        if api_key.is_empty() {
            return Err(ApiError::Unauthorized);
        }
        if self.rejected.contains(api_key) {
            return Err(ApiError::RateLimited);
        }
        let body = format!(r#"{{"status":"success","endpoint":"{endpoint}"}}"#);
        Ok(body)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Round-robin over `keys`, expiring the second key part way through.
///
/// Returns every key dispensed, in order.
pub async fn basic_rotation(pool: &KeyPool) -> key_pool::Result<Vec<String>> {
    let mut dispensed = Vec::new();
    for _ in 0..5 {
        dispensed.push(pool.get_key().await?);
    }

    if let Some(second) = pool.keys().await.get(1).cloned() {
        pool.mark_expired(&second).await?;
    }

    for _ in 0..4 {
        dispensed.push(pool.get_key().await?);
    }
    let stats = pool.stats().await;
    info!(stats = %stats, "basic rotation finished");
    Ok(dispensed)
}

/// Use keys until the TTL lapses, then show that the pool is exhausted.
///
/// Returns the keys dispensed before expiry and the error seen afterwards.
/// Fails if a key is still handed out once the TTL has passed.
pub async fn ttl_expiry(ttl: Duration) -> anyhow::Result<(Vec<String>, Error)> {
    let pool = KeyPool::builder(["short_lived_key_1", "short_lived_key_2"])
        .ttl(ttl)
        .build()?;

    let mut dispensed = Vec::new();
    for _ in 0..3 {
        dispensed.push(pool.get_key().await?);
    }

    tokio::time::sleep(ttl + Duration::from_secs(1)).await;
    match pool.get_key().await {
        Ok(key) => bail!("key {} outlived its TTL", common::key_hint(&key)),
        Err(e) => {
            info!(error = %e, "all keys expired due to TTL");
            Ok((dispensed, e))
        }
    }
}

/// Exhaust a single-key pool and let the fetcher supply replacements.
pub async fn dynamic_fetching() -> key_pool::Result<(String, PoolStats)> {
    let counter = Arc::new(AtomicUsize::new(0));
    let pool = KeyPool::builder(["initial_key"])
        .fetcher(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, FetchError>(format!("dynamically_fetched_key_{n}")) }
        })
        .build()?;

    let first = pool.get_key().await?;
    pool.mark_expired(&first).await?;

    let fetched = pool.get_key().await?;
    let stats = pool.stats().await;
    info!(
        total = stats.total_keys,
        available = stats.available_keys,
        "fetched replacement key"
    );
    Ok((fetched, stats))
}

/// Call a flaky API through `KeyRetry`; the first `failing` keys are rejected.
pub async fn retry_wrapper(
    max_retries: u32,
    failing: usize,
) -> key_pool::Result<(Result<String, RetryError<ApiError>>, usize, PoolStats)> {
    let keys: Vec<String> = (1..=3).map(|i| format!("decorator_key_{i}")).collect();
    let api = Arc::new(SimulatedApi::rejecting(keys.iter().take(failing).cloned()));
    let pool = Arc::new(KeyPool::new(keys)?);

    let retry = KeyRetry::new(pool.clone())
        .max_retries(max_retries)
        .retry_if(ApiError::is_key_failure);

    let result = retry
        .run(|key| {
            let api = api.clone();
            async move { api.call("/api/users", &key).await }
        })
        .await;

    Ok((result, api.calls(), pool.stats().await))
}

/// Fan `workers` tasks out over one pool and tally which key each received.
pub async fn concurrent_access(
    pool: Arc<KeyPool>,
    workers: usize,
) -> anyhow::Result<BTreeMap<String, usize>> {
    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let key = pool.get_key().await?;
            tokio::time::sleep(Duration::from_millis(10 + (worker as u64 % 5) * 10)).await;
            Ok::<_, Error>(key)
        }));
    }

    let mut tally = BTreeMap::new();
    for handle in handles {
        let key = handle.await.context("worker task panicked")??;
        *tally.entry(key).or_insert(0) += 1;
    }

    let stats = pool.stats().await;
    for stats in stats.keys {
        info!(key = %stats.key_hint, use_count = stats.use_count, "concurrent usage");
    }
    Ok(tally)
}

/// TTL, a finite backup fetcher, a manual expiry and a manual addition.
pub async fn complete_workflow() -> key_pool::Result<PoolStats> {
    let backups = Arc::new(Mutex::new(vec![
        "backup_key_1".to_string(),
        "backup_key_2".to_string(),
    ]));
    let pool = KeyPool::builder(["primary_key_1", "primary_key_2", "primary_key_3"])
        .ttl(Duration::from_secs(10))
        .fetcher(move || {
            let next = backups
                .lock()
                .map_err(|_| FetchError::from("backup list poisoned"))
                .and_then(|mut keys| {
                    if keys.is_empty() {
                        Err(FetchError::from("no more backup keys available"))
                    } else {
                        Ok(keys.remove(0))
                    }
                });
            async move { next }
        })
        .build()?;

    for _ in 0..5 {
        pool.get_key().await?;
    }
    pool.mark_expired("primary_key_2").await?;
    for _ in 0..3 {
        pool.get_key().await?;
    }
    pool.add_key("manually_added_key").await?;

    let stats = pool.stats().await;
    for key in &stats.keys {
        info!(
            key = %key.key_hint,
            status = if key.is_expired { "EXPIRED" } else { "ACTIVE" },
            use_count = key.use_count,
            "workflow key usage"
        );
    }
    Ok(stats)
}

/// With auto-remove on, expiring a key deletes it from the pool.
pub async fn auto_remove() -> key_pool::Result<Vec<String>> {
    let pool = KeyPool::builder(["auto_key_1", "auto_key_2", "auto_key_3"])
        .auto_remove_expired(true)
        .build()?;

    let key = pool.get_key().await?;
    pool.mark_expired(&key).await?;
    let remaining = pool.keys().await;
    info!(
        removed = %common::key_hint(&key),
        remaining = remaining.len(),
        "auto-removed expired key"
    );
    Ok(remaining)
}
