//! Analysis client error types.

use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analysis service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request rejected ({0}): {1}")]
    Rejected(u16, String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            404 => Self::JobNotFound(body),
            429 | 500..=599 => Self::ServiceUnavailable(format!("{}: {}", status, body)),
            _ => Self::Rejected(status, body),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::ServiceUnavailable(_) | AnalysisError::Network(_))
    }

    /// Safe to resend a submission: the request never reached the service.
    ///
    /// Any HTTP reply, 5xx included, may come after the job was created.
    pub fn is_retryable_submit(&self) -> bool {
        match self {
            AnalysisError::Network(e) => e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        assert!(matches!(
            AnalysisError::from_http_status(404, "x"),
            AnalysisError::JobNotFound(_)
        ));
        assert!(AnalysisError::from_http_status(503, "").is_retryable());
        assert!(!AnalysisError::from_http_status(503, "").is_retryable_submit());
        assert!(!AnalysisError::from_http_status(429, "").is_retryable_submit());
        assert!(!AnalysisError::from_http_status(422, "bad url").is_retryable());
    }
}
