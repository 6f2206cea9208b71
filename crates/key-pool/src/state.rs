//! Pool state machine
//!
//! `PoolState` owns every mutable piece of the pool: rotation order, per-key
//! records, the expired set and the cursor. It never locks; `KeyPool` wraps it
//! in a single mutex, so every method here runs inside one critical section.
//! Methods take `now` explicitly so a whole operation sees one timestamp.
//!
//! Invariants maintained by every method:
//! - `metadata` has exactly the keys in `order`, and `order` has no duplicates
//! - `expired` is a subset of `order`
//! - `cursor < order.len()` whenever `order` is non-empty

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use common::key_hint;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::record::KeyRecord;
use crate::stats::{KeyStats, PoolStats};
use crate::telemetry;

#[derive(Debug)]
pub(crate) struct PoolState {
    order: Vec<String>,
    metadata: HashMap<String, KeyRecord>,
    expired: HashSet<String>,
    cursor: usize,
    ttl: Option<Duration>,
    auto_remove_expired: bool,
}

impl PoolState {
    /// Build the initial state. Rejects an empty key list, empty keys and
    /// duplicates so the invariants hold from the first operation.
    pub(crate) fn new(
        keys: Vec<String>,
        ttl: Option<Duration>,
        auto_remove_expired: bool,
        now: Instant,
    ) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one API key must be provided".into(),
            ));
        }

        let mut metadata = HashMap::with_capacity(keys.len());
        for key in &keys {
            validate_key(key)?;
            if metadata.insert(key.clone(), KeyRecord::new(now)).is_some() {
                return Err(Error::DuplicateKey(key_hint(key)));
            }
        }

        Ok(Self {
            order: keys,
            metadata,
            expired: HashSet::new(),
            cursor: 0,
            ttl,
            auto_remove_expired,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    pub(crate) fn is_expired(&self, key: &str) -> bool {
        self.expired.contains(key)
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    pub(crate) fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Move every live key older than the TTL into the expired set.
    ///
    /// Returns the number of keys expired by this sweep. Auto-remove does not
    /// apply here; TTL-aged keys stay registered until removed or restored.
    pub(crate) fn sweep_ttl(&mut self, now: Instant) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let mut swept = 0;
        for key in &self.order {
            if self.expired.contains(key) {
                continue;
            }
            let Some(record) = self.metadata.get_mut(key) else {
                continue;
            };
            if record.is_past_ttl(now, ttl) {
                info!(
                    key = %key_hint(key),
                    ttl_secs = ttl.as_secs_f64(),
                    "key expired due to TTL"
                );
                record.expired_at = Some(now);
                self.expired.insert(key.clone());
                telemetry::record_expired("ttl");
                swept += 1;
            }
        }
        swept
    }

    pub(crate) fn available_count(&self) -> usize {
        self.order.len() - self.expired.len()
    }

    /// Dispense the next non-expired key, advancing the cursor one slot per
    /// key examined.
    ///
    /// Callers check `available_count() > 0` first; scanning a full lap
    /// without a hit means the expired set and order have drifted apart.
    pub(crate) fn next_key(&mut self, now: Instant) -> Result<String> {
        let n = self.order.len();
        for _ in 0..n {
            let idx = self.cursor;
            self.cursor = (self.cursor + 1) % n;

            let key = &self.order[idx];
            if self.expired.contains(key) {
                continue;
            }

            let record = self.metadata.get_mut(key).ok_or_else(|| {
                Error::InternalInconsistency(format!(
                    "key {} in rotation order has no metadata",
                    key_hint(key)
                ))
            })?;
            record.record_use(now);
            telemetry::record_dispensed();
            debug!(
                key = %key_hint(key),
                use_count = record.use_count,
                "key dispensed"
            );
            return Ok(key.clone());
        }

        Err(Error::InternalInconsistency(format!(
            "rotation scanned {n} keys without finding an available one"
        )))
    }

    /// Add `key` to the expired set, deleting it outright under auto-remove.
    pub(crate) fn mark_expired(&mut self, key: &str, now: Instant) -> Result<()> {
        let record = self
            .metadata
            .get_mut(key)
            .ok_or_else(|| Error::KeyNotFound(key_hint(key)))?;

        record.expired_at = Some(now);
        self.expired.insert(key.to_string());
        telemetry::record_expired("manual");
        info!(key = %key_hint(key), "key marked as expired");

        if self.auto_remove_expired {
            self.remove_key(key)?;
        }
        Ok(())
    }

    /// Return `key` to rotation and restart its TTL window.
    pub(crate) fn mark_valid(&mut self, key: &str, now: Instant) -> Result<()> {
        let record = self
            .metadata
            .get_mut(key)
            .ok_or_else(|| Error::KeyNotFound(key_hint(key)))?;

        record.restore(now);
        self.expired.remove(key);
        info!(key = %key_hint(key), "key marked as valid");
        Ok(())
    }

    /// Append `key` to the end of the rotation. The cursor is left alone.
    pub(crate) fn add_key(&mut self, key: String, now: Instant) -> Result<()> {
        validate_key(&key)?;
        if self.metadata.contains_key(&key) {
            return Err(Error::DuplicateKey(key_hint(&key)));
        }

        info!(
            key = %key_hint(&key),
            total = self.order.len() + 1,
            "new key added"
        );
        self.metadata.insert(key.clone(), KeyRecord::new(now));
        self.order.push(key);
        Ok(())
    }

    /// Delete `key` everywhere and re-clamp the cursor.
    ///
    /// Removing a key at or before the cursor can shift whose turn is next;
    /// only the cursor's validity is preserved.
    pub(crate) fn remove_key(&mut self, key: &str) -> Result<()> {
        if self.metadata.remove(key).is_none() {
            return Err(Error::KeyNotFound(key_hint(key)));
        }
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.expired.remove(key);

        if self.cursor >= self.order.len() && !self.order.is_empty() {
            self.cursor = 0;
        }

        telemetry::record_removed();
        info!(
            key = %key_hint(key),
            remaining = self.order.len(),
            "key removed"
        );
        Ok(())
    }

    /// Read-only snapshot. Keys past their TTL but not yet swept still count
    /// as available.
    pub(crate) fn stats(
        &self,
        now: Instant,
        wall_now_ms: u64,
        has_key_fetcher: bool,
    ) -> PoolStats {
        let keys = self
            .order
            .iter()
            .filter_map(|key| {
                let record = self.metadata.get(key)?;
                let last_used_ms = record.last_used.map(|at| {
                    let ago = now.saturating_duration_since(at).as_millis() as u64;
                    wall_now_ms.saturating_sub(ago)
                });
                Some(KeyStats {
                    key_hint: key_hint(key),
                    is_expired: self.expired.contains(key),
                    use_count: record.use_count,
                    last_used_ms,
                    age_secs: record.age(now).as_secs_f64(),
                })
            })
            .collect();

        PoolStats {
            total_keys: self.order.len(),
            available_keys: self.available_count(),
            expired_keys: self.expired.len(),
            current_index: self.cursor,
            ttl_secs: self.ttl.map(|ttl| ttl.as_secs_f64()),
            has_key_fetcher,
            keys,
        }
    }

    #[cfg(test)]
    pub(crate) fn record(&self, key: &str) -> Option<&KeyRecord> {
        self.metadata.get(key)
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let order_set: HashSet<&String> = self.order.iter().collect();
        assert_eq!(order_set.len(), self.order.len(), "duplicate keys in order");
        let meta_set: HashSet<&String> = self.metadata.keys().collect();
        assert_eq!(order_set, meta_set, "metadata domain differs from order");
        assert!(
            self.expired.iter().all(|k| order_set.contains(k)),
            "expired set contains unregistered key"
        );
        if !self.order.is_empty() {
            assert!(self.cursor < self.order.len(), "cursor out of range");
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("API keys must be non-empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(keys: &[&str]) -> PoolState {
        PoolState::new(
            keys.iter().map(|k| k.to_string()).collect(),
            None,
            false,
            Instant::now(),
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_empty_key_list() {
        let err = PoolState::new(vec![], None, false, Instant::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "got: {err:?}");
    }

    #[test]
    fn new_rejects_empty_key_string() {
        let err =
            PoolState::new(vec!["a".into(), "".into()], None, false, Instant::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "got: {err:?}");
    }

    #[test]
    fn new_rejects_duplicate_keys() {
        let err = PoolState::new(
            vec!["a".into(), "b".into(), "a".into()],
            None,
            false,
            Instant::now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)), "got: {err:?}");
    }

    #[test]
    fn rotation_cycles_in_insertion_order() {
        let mut s = state(&["a", "b", "c"]);
        let now = Instant::now();
        let got: Vec<String> = (0..6).map(|_| s.next_key(now).unwrap()).collect();
        assert_eq!(got, ["a", "b", "c", "a", "b", "c"]);
        assert_eq!(s.record("a").unwrap().use_count, 2);
        s.assert_invariants();
    }

    #[test]
    fn cursor_advances_past_skipped_keys() {
        let mut s = state(&["a", "b", "c"]);
        let now = Instant::now();
        s.mark_expired("a", now).unwrap();

        assert_eq!(s.next_key(now).unwrap(), "b");
        // Examined "a" and "b", so the cursor moved two slots.
        assert_eq!(s.cursor(), 2);
        assert_eq!(s.next_key(now).unwrap(), "c");
        assert_eq!(s.cursor(), 0);
    }

    #[test]
    fn next_key_with_everything_expired_is_inconsistent() {
        let mut s = state(&["a"]);
        let now = Instant::now();
        s.mark_expired("a", now).unwrap();
        assert_eq!(s.available_count(), 0);
        let err = s.next_key(now).unwrap_err();
        assert!(
            matches!(err, Error::InternalInconsistency(_)),
            "got: {err:?}"
        );
    }

    #[test]
    fn mark_expired_unknown_key() {
        let mut s = state(&["a"]);
        let err = s.mark_expired("zzz", Instant::now()).unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(_)));
    }

    #[test]
    fn mark_expired_with_auto_remove_deletes_key() {
        let mut s =
            PoolState::new(vec!["a".into(), "b".into()], None, true, Instant::now()).unwrap();
        s.mark_expired("a", Instant::now()).unwrap();
        assert_eq!(s.keys(), ["b"]);
        assert!(!s.contains("a"));
        assert_eq!(s.available_count(), 1);
        s.assert_invariants();
    }

    #[test]
    fn auto_remove_last_key_leaves_empty_pool() {
        let mut s = PoolState::new(vec!["a".into()], None, true, Instant::now()).unwrap();
        s.mark_expired("a", Instant::now()).unwrap();
        assert_eq!(s.len(), 0);
        assert_eq!(s.available_count(), 0);
        s.assert_invariants();
    }

    #[test]
    fn mark_valid_unknown_key() {
        let mut s = state(&["a"]);
        let err = s.mark_valid("zzz", Instant::now()).unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(_)));
    }

    #[test]
    fn mark_valid_on_live_key_resets_age() {
        let start = Instant::now();
        let mut s = PoolState::new(vec!["a".into()], None, false, start).unwrap();
        let later = start + Duration::from_secs(40);
        s.mark_valid("a", later).unwrap();
        assert_eq!(s.record("a").unwrap().added_at, later);
    }

    #[test]
    fn add_key_appends_without_moving_cursor() {
        let mut s = state(&["a", "b"]);
        let now = Instant::now();
        assert_eq!(s.next_key(now).unwrap(), "a");
        s.add_key("c".into(), now).unwrap();
        assert_eq!(s.cursor(), 1);
        assert_eq!(s.keys(), ["a", "b", "c"]);
        assert_eq!(s.next_key(now).unwrap(), "b");
        assert_eq!(s.next_key(now).unwrap(), "c");
        s.assert_invariants();
    }

    #[test]
    fn add_key_duplicate_leaves_state_unchanged() {
        let mut s = state(&["a", "b"]);
        let now = Instant::now();
        s.next_key(now).unwrap();
        let err = s.add_key("b".into(), now).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
        assert_eq!(s.keys(), ["a", "b"]);
        assert_eq!(s.cursor(), 1);
        assert_eq!(s.record("a").unwrap().use_count, 1);
    }

    #[test]
    fn remove_key_reclamps_cursor() {
        let mut s = state(&["a", "b", "c"]);
        let now = Instant::now();
        s.next_key(now).unwrap();
        s.next_key(now).unwrap();
        assert_eq!(s.cursor(), 2);

        s.remove_key("c").unwrap();
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.next_key(now).unwrap(), "a");
        s.assert_invariants();
    }

    #[test]
    fn remove_key_clears_expired_entry() {
        let mut s = state(&["a", "b"]);
        let now = Instant::now();
        s.mark_expired("a", now).unwrap();
        s.remove_key("a").unwrap();
        let stats = s.stats(now, 0, false);
        assert_eq!(stats.expired_keys, 0);
        assert_eq!(stats.total_keys, 1);
        s.assert_invariants();
    }

    #[test]
    fn remove_unknown_key() {
        let mut s = state(&["a"]);
        let err = s.remove_key("zzz").unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(_)));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn remove_all_keys_leaves_empty_pool() {
        let mut s = state(&["a", "b"]);
        s.remove_key("a").unwrap();
        s.remove_key("b").unwrap();
        assert_eq!(s.len(), 0);
        s.assert_invariants();
    }

    #[test]
    fn sweep_without_ttl_is_noop() {
        let mut s = state(&["a"]);
        let far = Instant::now() + Duration::from_secs(1_000_000);
        assert_eq!(s.sweep_ttl(far), 0);
        assert_eq!(s.available_count(), 1);
    }

    #[test]
    fn sweep_expires_only_aged_keys() {
        let start = Instant::now();
        let ttl = Duration::from_secs(60);
        let mut s = PoolState::new(vec!["old".into()], Some(ttl), false, start).unwrap();
        let young_at = start + Duration::from_secs(30);
        s.add_key("young".into(), young_at).unwrap();

        let at = start + Duration::from_secs(61);
        assert_eq!(s.sweep_ttl(at), 1);
        assert_eq!(s.record("old").unwrap().expired_at, Some(at));
        assert_eq!(s.next_key(at).unwrap(), "young");

        // Sweeping again does not re-stamp already expired keys.
        let again = at + Duration::from_secs(1);
        assert_eq!(s.sweep_ttl(again), 0);
        assert_eq!(s.record("old").unwrap().expired_at, Some(at));
    }

    #[test]
    fn stats_reports_counts_and_metadata() {
        let start = Instant::now();
        let mut s = PoolState::new(
            vec!["key_alpha_1".into(), "key_beta_22".into()],
            Some(Duration::from_secs(3600)),
            false,
            start,
        )
        .unwrap();
        let used_at = start + Duration::from_secs(5);
        s.next_key(used_at).unwrap();
        s.mark_expired("key_beta_22", used_at).unwrap();

        let now = start + Duration::from_secs(10);
        let stats = s.stats(now, 1_000_000, true);
        assert_eq!(stats.total_keys, 2);
        assert_eq!(stats.available_keys, 1);
        assert_eq!(stats.expired_keys, 1);
        assert_eq!(stats.current_index, 1);
        assert_eq!(stats.ttl_secs, Some(3600.0));
        assert!(stats.has_key_fetcher);

        let alpha = &stats.keys[0];
        assert_eq!(alpha.key_hint, "key_alph...");
        assert_eq!(alpha.use_count, 1);
        assert_eq!(alpha.last_used_ms, Some(1_000_000 - 5_000));
        assert!(!alpha.is_expired);
        assert_eq!(alpha.age_secs, 10.0);

        let beta = &stats.keys[1];
        assert!(beta.is_expired);
        assert_eq!(beta.last_used_ms, None);
    }

    #[test]
    fn stats_does_not_sweep() {
        let start = Instant::now();
        let ttl = Some(Duration::from_secs(1));
        let s = PoolState::new(vec!["a".into()], ttl, false, start).unwrap();
        let stats = s.stats(start + Duration::from_secs(100), 0, false);
        assert_eq!(stats.available_keys, 1);
        assert_eq!(stats.expired_keys, 0);
        assert!(!stats.keys[0].is_expired);
    }
}
