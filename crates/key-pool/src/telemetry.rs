//! Pool counters
//!
//! - `key_pool_dispensed_total` (counter)
//! - `key_pool_expired_total` (counter): label `reason` (`manual`, `ttl`)
//! - `key_pool_removed_total` (counter)
//! - `key_pool_fetch_total` (counter): label `outcome` (`ok`, `error`)
//! - `key_pool_retry_failures_total` (counter)
//!
//! Every call is a no-op until the host process installs a recorder.

/// Register descriptions for the pool's counters with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!("key_pool_dispensed_total", "Keys handed out by get_key");
    metrics::describe_counter!(
        "key_pool_expired_total",
        "Keys moved to the expired set, by reason"
    );
    metrics::describe_counter!("key_pool_removed_total", "Keys deleted from the pool");
    metrics::describe_counter!(
        "key_pool_fetch_total",
        "Key fetcher invocations, by outcome"
    );
    metrics::describe_counter!(
        "key_pool_retry_failures_total",
        "Retryable operation failures seen by KeyRetry"
    );
}

pub(crate) fn record_dispensed() {
    metrics::counter!("key_pool_dispensed_total").increment(1);
}

pub(crate) fn record_expired(reason: &'static str) {
    metrics::counter!("key_pool_expired_total", "reason" => reason).increment(1);
}

pub(crate) fn record_removed() {
    metrics::counter!("key_pool_removed_total").increment(1);
}

pub(crate) fn record_fetch(outcome: &'static str) {
    metrics::counter!("key_pool_fetch_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_retry_failure() {
    metrics::counter!("key_pool_retry_failures_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        describe_metrics();
        record_dispensed();
        record_expired("ttl");
        record_removed();
        record_fetch("ok");
        record_retry_failure();
    }
}
