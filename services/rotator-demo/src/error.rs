//! Errors returned by the simulated upstream API

use thiserror::Error;

/// Failure modes of `SimulatedApi` calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("API rate limit exceeded")]
    RateLimited,

    #[error("API key rejected")]
    Unauthorized,

    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// Failures that a different key might fix.
    pub fn is_key_failure(&self) -> bool {
        matches!(self, ApiError::RateLimited | ApiError::Unauthorized)
    }
}
