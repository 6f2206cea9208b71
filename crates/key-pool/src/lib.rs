//! Rotating pool of opaque API keys
//!
//! Hands out keys round-robin, skipping any that have been marked expired or
//! have outlived the configured TTL. When every key is unusable the pool can
//! ask a caller-supplied fetcher for a replacement. All state lives behind a
//! single mutex so rotation stays fair while keys are added and removed from
//! other tasks.
//!
//! Key lifecycle:
//! 1. Key registered at construction or via `add_key` → available
//! 2. `get_key` dispenses keys in insertion order, wrapping around
//! 3. `mark_expired` (or TTL age) → skipped by rotation; deleted outright when
//!    auto-remove is enabled
//! 4. `mark_valid` → back in rotation with a fresh TTL window
//! 5. `remove_key` → gone, cursor re-clamped
//!
//! `KeyRetry` layers retry-with-a-fresh-key behaviour on top of the pool.

pub mod error;
pub mod fetcher;
pub mod pool;
mod record;
pub mod retry;
mod state;
pub mod stats;
mod telemetry;

pub use error::{Error, Result};
pub use fetcher::{FetchError, KeyFetcher};
pub use pool::{KeyPool, KeyPoolBuilder};
pub use retry::{KeyRetry, RetryError};
pub use stats::{KeyStats, PoolStats};
pub use telemetry::describe_metrics;
