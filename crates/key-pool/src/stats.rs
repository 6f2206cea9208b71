//! Read-only pool snapshots

use std::fmt;

use serde::Serialize;

/// Point-in-time view of the pool, produced by `KeyPool::stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub total_keys: usize,
    /// Keys not in the expired set. Keys past their TTL count here until the
    /// next `get_key` sweeps them.
    pub available_keys: usize,
    pub expired_keys: usize,
    /// Rotation cursor: index of the next key `get_key` will examine.
    pub current_index: usize,
    pub ttl_secs: Option<f64>,
    pub has_key_fetcher: bool,
    /// Per-key usage, in rotation order.
    pub keys: Vec<KeyStats>,
}

/// Usage summary for one key. The key itself only appears as a hint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyStats {
    pub key_hint: String,
    pub is_expired: bool,
    pub use_count: u64,
    /// Unix timestamp in milliseconds of the most recent dispensation.
    pub last_used_ms: Option<u64>,
    /// Seconds since the key was added or last restored.
    pub age_secs: f64,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KeyPool(total={}, available={}, expired={})",
            self.total_keys, self.available_keys, self.expired_keys
        )
    }
}
