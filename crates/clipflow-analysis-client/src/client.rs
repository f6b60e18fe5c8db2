//! Analysis service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use clipflow_models::JobId;

use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{AnalysisRequest, HealthResponse, JobStatusReport, SubmitResponse};

/// Asynchronous analysis job service.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Submit an asset for analysis.
    async fn submit(&self, request: &AnalysisRequest) -> AnalysisResult<SubmitResponse>;

    /// Fetch the current status of a job.
    async fn status(&self, job_id: &JobId) -> AnalysisResult<JobStatusReport>;

    /// Whether the service reports itself healthy.
    async fn health_check(&self) -> AnalysisResult<bool>;
}

/// Configuration for the analysis client.
#[derive(Debug, Clone)]
pub struct AnalysisClientConfig {
    /// Base URL of the analysis service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
    /// Base delay between retries
    pub retry_base_delay: Duration,
}

impl Default for AnalysisClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl AnalysisClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("ANALYSIS_SERVICE_URL").unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(
                std::env::var("ANALYSIS_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("ANALYSIS_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: defaults.retry_base_delay,
        }
    }
}

/// HTTP client for the analysis service.
pub struct AnalysisClient {
    http: Client,
    config: AnalysisClientConfig,
}

impl AnalysisClient {
    /// Create a new analysis client.
    pub fn new(config: AnalysisClientConfig) -> AnalysisResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("clipflow-analysis-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AnalysisError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> AnalysisResult<Self> {
        Self::new(AnalysisClientConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> AnalysisResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::from_http_status(status.as_u16(), body));
        }
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| AnalysisError::InvalidResponse(format!("{}: {}", e, body)))
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(
        &self,
        retryable: fn(&AnalysisError) -> bool,
        operation: F,
    ) -> AnalysisResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = AnalysisResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if retryable(&e) && attempt < self.config.max_retries => {
                    let delay = self.config.retry_base_delay * 2u32.saturating_pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Analysis request failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| AnalysisError::RequestFailed("Unknown error".to_string())))
    }
}

#[async_trait]
impl AnalysisService for AnalysisClient {
    async fn submit(&self, request: &AnalysisRequest) -> AnalysisResult<SubmitResponse> {
        let url = self.url("/jobs");
        debug!(asset_id = %request.media_asset_id, "Submitting analysis job to {}", url);

        // A server-side error may still have created the job, so only
        // requests that never connected are sent again.
        let response: SubmitResponse = self
            .with_retry(AnalysisError::is_retryable_submit, || async {
                let response = self.http.post(&url).json(request).send().await?;
                Self::parse(response).await
            })
            .await?;

        info!(
            job_id = %response.job_id,
            asset_id = %request.media_asset_id,
            status = %response.status,
            "Analysis job accepted"
        );
        Ok(response)
    }

    async fn status(&self, job_id: &JobId) -> AnalysisResult<JobStatusReport> {
        let url = self.url(&format!("/jobs/{}", urlencoding::encode(job_id.as_str())));

        // One request per call; the caller's poll loop owns the retry cadence.
        let response = self.http.get(&url).send().await?;
        Self::parse(response).await
    }

    async fn health_check(&self) -> AnalysisResult<bool> {
        let url = self.url("/health");

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Analysis service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Analysis service health check error: {}", e);
                Ok(false)
            }
        }
    }
}
