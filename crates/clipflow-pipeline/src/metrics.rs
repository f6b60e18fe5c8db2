//! Pipeline metrics.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Upload chunks retried after a transient failure.
    pub const UPLOAD_CHUNK_RETRIES_TOTAL: &str = "pipeline_upload_chunk_retries_total";

    /// Uploads finished by outcome.
    pub const UPLOADS_TOTAL: &str = "pipeline_uploads_total";

    /// Status polls issued.
    pub const POLL_ATTEMPTS_TOTAL: &str = "pipeline_poll_attempts_total";

    /// Status polls that failed and were counted as a miss.
    pub const POLL_MISSES_TOTAL: &str = "pipeline_poll_misses_total";

    /// Jobs finished by outcome.
    pub const JOBS_TOTAL: &str = "pipeline_jobs_total";

    /// Credit deductions by outcome.
    pub const CREDIT_DEDUCTIONS_TOTAL: &str = "pipeline_credit_deductions_total";
}

pub fn record_chunk_retry() {
    counter!(names::UPLOAD_CHUNK_RETRIES_TOTAL).increment(1);
}

pub fn record_upload(outcome: &'static str) {
    counter!(names::UPLOADS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_poll_attempt() {
    counter!(names::POLL_ATTEMPTS_TOTAL).increment(1);
}

pub fn record_poll_miss() {
    counter!(names::POLL_MISSES_TOTAL).increment(1);
}

pub fn record_job(outcome: &'static str) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome).increment(1);
}

/// `outcome` is one of `charged`, `replayed`, `skipped` or `failed`.
pub fn record_deduction(outcome: &'static str) {
    counter!(names::CREDIT_DEDUCTIONS_TOTAL, "outcome" => outcome).increment(1);
}
