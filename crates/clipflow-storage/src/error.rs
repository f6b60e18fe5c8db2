//! Storage error types.

use std::time::Duration;

use thiserror::Error;

/// Delay assumed for a 429 that carries no usable `Retry-After`.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Failed to open upload session: {0}")]
    SessionCreateFailed(String),

    #[error("Upload session expired: {0}")]
    SessionExpired(String),

    #[error("Chunk at offset {offset} failed: {reason}")]
    ChunkFailed { offset: u64, reason: String },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Finalize failed: {0}")]
    FinalizeFailed(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Request rejected ({0}): {1}")]
    Rejected(u16, String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn chunk_failed(offset: u64, reason: impl Into<String>) -> Self {
        Self::ChunkFailed {
            offset,
            reason: reason.into(),
        }
    }

    pub fn protocol_violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Map an unexpected HTTP status to an error.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        Self::from_http_reply(status, None, body)
    }

    /// Map an unexpected HTTP reply to an error, keeping the server's
    /// `Retry-After` (delta seconds) on a 429.
    pub fn from_http_reply(
        status: u16,
        retry_after: Option<&str>,
        body: impl Into<String>,
    ) -> Self {
        let body = body.into();
        match status {
            404 | 410 => Self::SessionExpired(body),
            429 => Self::RateLimited(
                retry_after
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(|secs| secs.saturating_mul(1000))
                    .unwrap_or(DEFAULT_RATE_LIMIT_MS),
            ),
            500..=599 => Self::ServerError(status, body),
            _ => Self::Rejected(status, body),
        }
    }

    /// Server-suggested wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            StorageError::RateLimited(ms) => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    /// Whether the operation may succeed if resumed from the last
    /// acknowledged offset.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::ChunkFailed { .. }
            | StorageError::RateLimited(_)
            | StorageError::ServerError(_, _) => true,
            StorageError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StorageError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
