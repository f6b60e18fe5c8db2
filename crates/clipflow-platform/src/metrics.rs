//! Platform client metrics.
//!
//! Requests are labelled with an outcome class rather than the raw status
//! code, so dashboards can separate caller mistakes from platform outages.

use metrics::{counter, histogram};

use crate::error::{PlatformError, PlatformResult};

pub mod names {
    /// Requests by operation and outcome class.
    pub const REQUESTS_TOTAL: &str = "platform_requests_total";

    /// Request duration in seconds, retries included, by operation.
    pub const REQUEST_DURATION_SECONDS: &str = "platform_request_duration_seconds";

    /// Retried attempts by operation.
    pub const RETRIES_TOTAL: &str = "platform_retries_total";

    /// Retryable failures left unretried because the write carried no idempotency key.
    pub const UNKEYED_WRITE_FAILURES_TOTAL: &str = "platform_unkeyed_write_failures_total";

    /// Deductions the ledger recognised as replays.
    pub const REPLAYED_DEDUCTIONS_TOTAL: &str = "platform_replayed_deductions_total";
}

/// Outcome class of a finished request.
pub fn outcome_class<T>(result: &PlatformResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(PlatformError::RateLimited(_)) => "rate_limited",
        Err(PlatformError::ServerError(_, _)) => "server_error",
        Err(PlatformError::Network(_)) => "network",
        Err(PlatformError::InvalidResponse(_) | PlatformError::Json(_)) => "invalid_response",
        Err(_) => "client_error",
    }
}

pub fn record_request(operation: &str, outcome: &'static str, elapsed_secs: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(names::REQUEST_DURATION_SECONDS, "operation" => operation.to_string())
        .record(elapsed_secs);
}

pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_unkeyed_write_failure(operation: &str) {
    counter!(names::UNKEYED_WRITE_FAILURES_TOTAL, "operation" => operation.to_string())
        .increment(1);
}

pub fn record_replayed_deduction() {
    counter!(names::REPLAYED_DEDUCTIONS_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_class() {
        assert_eq!(outcome_class(&Ok::<(), PlatformError>(())), "ok");
        assert_eq!(
            outcome_class::<()>(&Err(PlatformError::from_http_status(503, ""))),
            "server_error"
        );
        assert_eq!(
            outcome_class::<()>(&Err(PlatformError::from_http_status(429, ""))),
            "rate_limited"
        );
        assert_eq!(
            outcome_class::<()>(&Err(PlatformError::from_http_status(404, ""))),
            "client_error"
        );
    }
}
