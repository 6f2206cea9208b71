//! Error types for pool operations

use crate::fetcher::FetchError;

/// Errors from pool operations.
///
/// Variants that name a key carry its redacted hint, never the full value.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("key not found in pool: {0}")]
    KeyNotFound(String),

    #[error("key already exists in pool: {0}")]
    DuplicateKey(String),

    #[error("no valid keys available and no key fetcher configured")]
    NoKeysAvailable,

    /// The key fetcher failed. Its error is passed through unchanged.
    #[error(transparent)]
    Fetch(FetchError),

    /// Rotation could not find a key even though the availability check
    /// passed. Unreachable while the pool invariants hold.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_is_transparent() {
        let source = std::io::Error::new(std::io::ErrorKind::TimedOut, "vault timed out");
        let err = Error::Fetch(Box::new(source));
        assert_eq!(err.to_string(), "vault timed out");
    }

    #[test]
    fn display_messages_name_the_key_hint() {
        assert_eq!(
            Error::KeyNotFound("sk-12345...".into()).to_string(),
            "key not found in pool: sk-12345..."
        );
        assert_eq!(
            Error::DuplicateKey("sk-12345...".into()).to_string(),
            "key already exists in pool: sk-12345..."
        );
    }
}
