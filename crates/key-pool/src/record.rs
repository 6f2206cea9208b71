//! Per-key usage metadata

use std::time::Duration;

use tokio::time::Instant;

/// Usage and expiry bookkeeping for one key, owned by the pool.
///
/// Instants come from `tokio::time` so a paused test clock drives TTL ages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyRecord {
    /// Set on insertion and reset by `mark_valid`; the TTL clock starts here.
    pub(crate) added_at: Instant,
    pub(crate) last_used: Option<Instant>,
    pub(crate) use_count: u64,
    pub(crate) expired_at: Option<Instant>,
}

impl KeyRecord {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            added_at: now,
            last_used: None,
            use_count: 0,
            expired_at: None,
        }
    }

    /// Time since the key was added or last restored.
    pub(crate) fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.added_at)
    }

    /// Whether the key has outlived `ttl`. The boundary itself is still valid.
    pub(crate) fn is_past_ttl(&self, now: Instant, ttl: Duration) -> bool {
        self.age(now) > ttl
    }

    pub(crate) fn record_use(&mut self, now: Instant) {
        self.last_used = Some(now);
        self.use_count += 1;
    }

    pub(crate) fn restore(&mut self, now: Instant) {
        self.expired_at = None;
        self.added_at = now;
    }
}
