//! Pipeline configuration.

use std::time::Duration;

use clipflow_models::credit_cost::{DEFAULT_CREDITS_PER_MINUTE, DEFAULT_MIN_JOB_CREDITS};

const MB: u64 = 1024 * 1024;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upload chunk size in bytes
    pub chunk_size_bytes: u64,
    /// Consecutive failed attempts allowed per chunk before giving up
    pub max_chunk_retries: u32,
    /// Base delay for chunk retry backoff (doubles each attempt)
    pub upload_retry_base: Duration,
    /// Cap on chunk retry backoff
    pub upload_retry_max: Duration,
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Status polls before giving up with a timeout
    pub poll_max_attempts: u32,
    /// Credits per started minute of media, for the pre-flight estimate
    pub credits_per_minute: u32,
    /// Floor for the pre-flight estimate
    pub min_job_credits: u32,
    /// Upper bound on clips requested per job
    pub max_clips_per_job: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 32 * MB,
            max_chunk_retries: 5,
            upload_retry_base: Duration::from_millis(500),
            upload_retry_max: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            poll_max_attempts: 60, // ~2 minutes at the default interval
            credits_per_minute: DEFAULT_CREDITS_PER_MINUTE,
            min_job_credits: DEFAULT_MIN_JOB_CREDITS,
            max_clips_per_job: 10,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            chunk_size_bytes: std::env::var("UPLOAD_CHUNK_SIZE_MB")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|mb| *mb > 0)
                .map(|mb| mb * MB)
                .unwrap_or(defaults.chunk_size_bytes),
            max_chunk_retries: std::env::var("UPLOAD_MAX_CHUNK_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_chunk_retries),
            upload_retry_base: Duration::from_millis(
                std::env::var("UPLOAD_RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            upload_retry_max: defaults.upload_retry_max,
            poll_interval: Duration::from_secs(
                std::env::var("POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            ),
            poll_max_attempts: std::env::var("POLL_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.poll_max_attempts),
            credits_per_minute: std::env::var("CREDITS_PER_MINUTE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.credits_per_minute),
            min_job_credits: std::env::var("MIN_JOB_CREDITS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_job_credits),
            max_clips_per_job: std::env::var("MAX_CLIPS_PER_JOB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_clips_per_job),
        }
    }
}
