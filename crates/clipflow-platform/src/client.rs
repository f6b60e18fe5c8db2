//! Platform REST API client.
//!
//! - Bearer API key authentication
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter
//! - Observability (tracing spans, metrics)

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info_span, warn, Instrument};

use crate::error::{PlatformError, PlatformResult};
use crate::metrics::{outcome_class, record_request, record_unkeyed_write_failure};
use crate::retry::{with_retry, RetryConfig};

/// Header carrying a caller-supplied idempotency key on writes.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

// =============================================================================
// Configuration
// =============================================================================

/// Platform client configuration.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Base URL of the platform API
    pub base_url: String,
    /// API key sent as a bearer token
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl PlatformConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> PlatformResult<Self> {
        let base_url = std::env::var("PLATFORM_API_URL")
            .map_err(|_| PlatformError::config_error("PLATFORM_API_URL must be set"))?;

        if base_url.is_empty() {
            return Err(PlatformError::config_error("PLATFORM_API_URL cannot be empty"));
        }

        let connect_timeout_secs: u64 = std::env::var("PLATFORM_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            base_url,
            api_key: std::env::var("PLATFORM_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// Platform REST API client.
#[derive(Clone)]
pub struct PlatformClient {
    http: Client,
    config: PlatformConfig,
}

impl PlatformClient {
    /// Create a new platform client.
    pub fn new(config: PlatformConfig) -> PlatformResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("clipflow-platform/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(PlatformError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> PlatformResult<Self> {
        Self::new(PlatformConfig::from_env()?)
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    // =========================================================================
    // Request helpers
    // =========================================================================

    /// GET a JSON resource.
    pub async fn get_json<T>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> PlatformResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);

        self.execute_request(operation, &url, async {
            with_retry(&self.config.retry, operation, || async {
                let response = self
                    .authorize(self.http.get(&url))
                    .query(query)
                    .send()
                    .await?;
                Self::parse_response(&url, response).await
            })
            .await
        })
        .await
    }

    /// POST a JSON body with extra headers.
    ///
    /// Only requests carrying an `Idempotency-Key` header are retried; a
    /// failed reply to an unkeyed write may still have been applied.
    pub async fn post_json<B, T>(
        &self,
        operation: &str,
        path: &str,
        body: &B,
        headers: &[(&str, &str)],
    ) -> PlatformResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let keyed = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(IDEMPOTENCY_KEY_HEADER));

        let send = || async {
            let mut builder = self.authorize(self.http.post(&url)).json(body);
            for (name, value) in headers {
                builder = builder.header(*name, *value);
            }
            let response = builder.send().await?;
            Self::parse_response(&url, response).await
        };

        self.execute_request(operation, &url, async {
            if keyed {
                return with_retry(&self.config.retry, operation, &send).await;
            }
            let result = send().await;
            if let Err(e) = &result {
                if e.is_retryable() {
                    warn!(operation = %operation, "Unkeyed write failed, not retrying: {}", e);
                    record_unkeyed_write_failure(operation);
                }
            }
            result
        })
        .await
    }

    /// Check the platform health endpoint.
    pub async fn health_check(&self) -> PlatformResult<()> {
        let url = self.url("/health");
        let response = self.authorize(self.http.get(&url)).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::handle_error_response(&url, response).await)
        }
    }

    async fn parse_response<T: DeserializeOwned>(
        url: &str,
        response: Response,
    ) -> PlatformResult<T> {
        if !response.status().is_success() {
            return Err(Self::handle_error_response(url, response).await);
        }
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| PlatformError::InvalidResponse(format!("{}: {}", url, e)))
    }

    async fn execute_request<T, F>(&self, operation: &str, url: &str, fut: F) -> PlatformResult<T>
    where
        F: std::future::Future<Output = PlatformResult<T>>,
    {
        let span = info_span!("platform_request", operation = %operation, url = %url);

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let elapsed = start.elapsed();

        let outcome = outcome_class(&result);
        debug!(
            operation,
            outcome,
            latency_ms = elapsed.as_millis() as u64,
            "Platform request finished"
        );
        record_request(operation, outcome, elapsed.as_secs_f64());

        result
    }

    async fn handle_error_response(url: &str, response: Response) -> PlatformError {
        let status = response.status().as_u16();
        let retry_after_secs: Option<u64> = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body = response.text().await.unwrap_or_default();

        let err = PlatformError::from_http_status(status, format!("{} failed: {}", url, body));
        match (err, retry_after_secs) {
            (PlatformError::RateLimited(_), Some(secs)) => PlatformError::RateLimited(secs * 1000),
            (err, _) => err,
        }
    }
}
