//! Client Error Types

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network failure, timeout or server-side 5xx
    #[error("Could not reach license server: {0}")]
    Unreachable(String),

    /// The server's rate limiter turned the request away
    #[error("license server is rate limiting requests")]
    Throttled { retry_after: Option<Duration> },

    /// The server answered with something that is not a validation response
    #[error("unexpected license server response: {0}")]
    Protocol(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// The server looked at the key and said no
    #[error("License validation failed: {0}")]
    Rejected(String),
}

impl ClientError {
    /// Failures that say nothing about the key itself
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Unreachable(_) | ClientError::Throttled { .. })
    }
}
