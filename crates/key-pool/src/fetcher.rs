//! Replenishment hook invoked when the pool runs dry

use std::future::Future;
use std::pin::Pin;

/// Boxed error returned by a key fetcher. Surfaced to callers unchanged.
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Caller-supplied source of fresh keys.
///
/// `KeyPool::get_key` awaits `fetch` without holding the pool lock, so a slow
/// fetcher never blocks other pool operations. The returned key must not
/// already be in the pool; a duplicate surfaces as `Error::DuplicateKey`.
///
/// Timeouts and cancellation are the fetcher's concern. Wrap the body in
/// `tokio::time::timeout` if the source can hang.
///
/// Uses `Pin<Box<dyn Future>>` so the pool can hold a `Box<dyn KeyFetcher>`.
/// Any `Fn() -> impl Future<Output = Result<String, E>>` closure implements it.
pub trait KeyFetcher: Send + Sync {
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + '_>>;
}

impl<F, Fut, E> KeyFetcher for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, E>> + Send + 'static,
    E: Into<FetchError> + 'static,
{
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + '_>> {
        let fut = (self)();
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn closure_fetcher_returns_key() {
        let fetcher = || async { Ok::<_, std::io::Error>("fresh-key".to_string()) };
        assert_eq!(fetcher.fetch().await.unwrap(), "fresh-key");
    }

    #[tokio::test]
    async fn closure_fetcher_error_is_boxed() {
        let fetcher = || async {
            Err::<String, _>(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "key service down",
            ))
        };
        let err = fetcher.fetch().await.unwrap_err();
        assert_eq!(err.to_string(), "key service down");
    }

    #[tokio::test]
    async fn stateful_fetcher_generates_distinct_keys() {
        let counter = Arc::new(AtomicUsize::new(0));
        let fetcher = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, FetchError>(format!("generated-{n}")) }
        };
        let boxed: Box<dyn KeyFetcher> = Box::new(fetcher);
        assert_eq!(boxed.fetch().await.unwrap(), "generated-0");
        assert_eq!(boxed.fetch().await.unwrap(), "generated-1");
    }
}
