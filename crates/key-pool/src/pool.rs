//! Thread-safe key pool with round-robin dispensation
//!
//! The pool wraps `PoolState` in one `tokio::sync::Mutex`. Every operation
//! holds the lock for its full duration except the fetcher call in `get_key`,
//! which runs unlocked; its result is applied through the normal `add_key`
//! path. Concurrent exhaustion can therefore invoke the fetcher more than once.
//!
//! TTL expiry is lazy: each `get_key` sweeps aged keys before choosing one.
//! There is no background timer.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::fetcher::KeyFetcher;
use crate::state::PoolState;
use crate::stats::PoolStats;
use crate::telemetry;

/// Pool of API keys shared across tasks, usually behind an `Arc`.
pub struct KeyPool {
    state: Mutex<PoolState>,
    fetcher: Option<Box<dyn KeyFetcher>>,
}

/// Configures optional pool behaviour before construction.
pub struct KeyPoolBuilder {
    keys: Vec<String>,
    ttl: Option<Duration>,
    fetcher: Option<Box<dyn KeyFetcher>>,
    auto_remove_expired: bool,
}

impl KeyPoolBuilder {
    /// Expire keys implicitly once they are older than `ttl`.
    ///
    /// A zero TTL disables age-based expiry.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    /// Source of replacement keys when every registered key is expired.
    pub fn fetcher(mut self, fetcher: impl KeyFetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// Delete keys from the pool as soon as they are marked expired.
    pub fn auto_remove_expired(mut self, enabled: bool) -> Self {
        self.auto_remove_expired = enabled;
        self
    }

    /// Fails with `InvalidArgument` for an empty key list or an empty key,
    /// and `DuplicateKey` if a key appears twice.
    pub fn build(self) -> Result<KeyPool> {
        let count = self.keys.len();
        let state = PoolState::new(
            self.keys,
            self.ttl,
            self.auto_remove_expired,
            Instant::now(),
        )?;
        info!(
            keys = count,
            ttl_secs = self.ttl.map(|t| t.as_secs_f64()),
            has_key_fetcher = self.fetcher.is_some(),
            auto_remove_expired = self.auto_remove_expired,
            "key pool initialized"
        );
        Ok(KeyPool {
            state: Mutex::new(state),
            fetcher: self.fetcher,
        })
    }
}

impl KeyPool {
    /// Pool with no TTL, no fetcher and auto-remove disabled.
    pub fn new<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder(keys).build()
    }

    pub fn builder<I, S>(keys: I) -> KeyPoolBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KeyPoolBuilder {
            keys: keys.into_iter().map(Into::into).collect(),
            ttl: None,
            fetcher: None,
            auto_remove_expired: false,
        }
    }

    /// Return the next usable key.
    ///
    /// Sweeps TTL-aged keys, then scans forward from the cursor for a key not
    /// in the expired set, recording the use. With nothing available, awaits
    /// the fetcher (outside the lock) and registers and returns its key
    /// without moving the cursor or counting a use.
    ///
    /// Errors: `NoKeysAvailable` with no fetcher, the fetcher's own error as
    /// `Fetch`, or `DuplicateKey` if the fetcher returned a registered key.
    pub async fn get_key(&self) -> Result<String> {
        let fetcher = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            state.sweep_ttl(now);

            if state.available_count() > 0 {
                return state.next_key(now);
            }

            match self.fetcher.as_deref() {
                Some(fetcher) => fetcher,
                None => {
                    warn!(
                        total = state.len(),
                        "no valid keys available and no key fetcher configured"
                    );
                    return Err(Error::NoKeysAvailable);
                }
            }
        };

        info!("no available keys, fetching new key");
        let key = match fetcher.fetch().await {
            Ok(key) => {
                telemetry::record_fetch("ok");
                key
            }
            Err(e) => {
                telemetry::record_fetch("error");
                warn!(error = %e, "key fetcher failed");
                return Err(Error::Fetch(e));
            }
        };

        self.add_key(key.clone()).await?;
        Ok(key)
    }

    /// Remove `key` from rotation, or delete it when auto-remove is enabled.
    pub async fn mark_expired(&self, key: &str) -> Result<()> {
        self.state.lock().await.mark_expired(key, Instant::now())
    }

    /// Restore `key` to rotation with a fresh TTL window.
    pub async fn mark_valid(&self, key: &str) -> Result<()> {
        self.state.lock().await.mark_valid(key, Instant::now())
    }

    /// Register a new key at the end of the rotation.
    pub async fn add_key(&self, key: impl Into<String>) -> Result<()> {
        self.state.lock().await.add_key(key.into(), Instant::now())
    }

    /// Delete `key` from the pool entirely.
    pub async fn remove_key(&self, key: &str) -> Result<()> {
        self.state.lock().await.remove_key(key)
    }

    /// Snapshot of counts and per-key usage. Does not apply the TTL sweep.
    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        state.stats(Instant::now(), unix_millis(), self.fetcher.is_some())
    }

    /// Number of registered keys, expired ones included.
    pub async fn size(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.contains(key)
    }

    /// Registered keys in rotation order.
    pub async fn keys(&self) -> Vec<String> {
        self.state.lock().await.keys()
    }

    pub async fn ttl(&self) -> Option<Duration> {
        self.state.lock().await.ttl()
    }

    /// Whether `key` is registered and currently in rotation.
    pub async fn is_available(&self, key: &str) -> bool {
        let state = self.state.lock().await;
        state.contains(key) && !state.is_expired(key)
    }
}

impl std::fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPool")
            .field("has_key_fetcher", &self.fetcher.is_some())
            .finish_non_exhaustive()
    }
}

/// Current wall-clock time as unix milliseconds.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
