//! Retry an operation with a fresh key after each failure
//!
//! `KeyRetry` draws a key from the pool for every attempt and hands it to the
//! operation. A failure the predicate classifies as retryable marks that key
//! expired and moves on to the next attempt; anything else is returned at once
//! with the pool untouched.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use common::key_hint;
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::pool::KeyPool;
use crate::telemetry;

/// Default number of attempts made by `KeyRetry::new`.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Failure from a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The pool could not supply a key.
    #[error(transparent)]
    Pool(#[from] Error),

    /// The operation failed: either non-retryable, or the last attempt.
    #[error("operation failed: {0}")]
    Operation(E),
}

impl<E> RetryError<E> {
    /// The operation's own error, if that is what ended the retries.
    pub fn into_operation(self) -> Option<E> {
        match self {
            RetryError::Operation(e) => Some(e),
            RetryError::Pool(_) => None,
        }
    }
}

type RetryPredicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// Retry policy bound to a pool.
///
/// ```ignore
/// let retry = KeyRetry::new(pool.clone())
///     .max_retries(5)
///     .retry_if(|e: &ApiError| e.is_auth_failure());
/// let body = retry.run(|key| client.fetch(url, key)).await?;
/// ```
pub struct KeyRetry<E> {
    pool: Arc<KeyPool>,
    max_retries: u32,
    retry_if: RetryPredicate<E>,
}

impl<E: fmt::Display> KeyRetry<E> {
    /// Three attempts, every error retryable.
    pub fn new(pool: Arc<KeyPool>) -> Self {
        Self {
            pool,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_if: Box::new(|_| true),
        }
    }

    /// Total attempts, including the first. Zero fails every `run`.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Only errors for which `predicate` returns true expire the key and retry.
    pub fn retry_if(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.retry_if = Box::new(predicate);
        self
    }

    /// Run `op` with a freshly drawn key per attempt.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute(None, op).await
    }

    /// Run `op` with a caller-supplied key.
    ///
    /// A key is still drawn from the pool for every attempt, and it is that
    /// drawn key which is marked expired on a retryable failure.
    pub async fn run_with_key<T, F, Fut>(&self, key: &str, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute(Some(key), op).await
    }

    async fn execute<T, F, Fut>(
        &self,
        supplied: Option<&str>,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.max_retries == 0 {
            let err = Error::InvalidArgument("max_retries must be at least 1".into());
            return Err(err.into());
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let drawn = self.pool.get_key().await?;
            let key = supplied.map_or_else(|| drawn.clone(), str::to_owned);

            let err = match op(key).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !(self.retry_if)(&err) {
                debug!(attempt, error = %err, "non-retryable failure");
                return Err(RetryError::Operation(err));
            }

            telemetry::record_retry_failure();
            warn!(
                attempt,
                max_retries = self.max_retries,
                key = %key_hint(&drawn),
                error = %err,
                "attempt failed"
            );

            match self.pool.mark_expired(&drawn).await {
                Ok(()) => {}
                // Already removed by another caller or by auto-remove.
                Err(Error::KeyNotFound(_)) => {}
                Err(other) => return Err(other.into()),
            }

            if attempt >= self.max_retries {
                error!(max_retries = self.max_retries, "all attempts failed");
                return Err(RetryError::Operation(err));
            }
        }
    }
}
