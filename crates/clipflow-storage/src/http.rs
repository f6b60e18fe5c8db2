//! HTTP resumable-upload transport.
//!
//! Protocol:
//! - `POST {api}/uploads` opens a session and returns an upload URL
//! - `PUT {upload_url}` with `Content-Range: bytes s-e/total` sends a chunk;
//!   `308` with `Range: bytes=0-N` means `N + 1` bytes are committed, `200`/`201`
//!   means the whole object is committed
//! - `PUT {upload_url}` with `Content-Range: bytes */total` and no body
//!   queries the committed offset
//! - `POST {api}/uploads/{id}/complete` finalizes and returns the asset ID

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, RANGE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::transport::{
    ChunkAck, ChunkRange, RemoteSession, StoredObject, UploadTarget, UploadTransport,
};

/// Status code signalling an incomplete resumable upload.
const RESUME_INCOMPLETE: u16 = 308;

/// Configuration for the HTTP upload API.
#[derive(Debug, Clone)]
pub struct HttpUploadConfig {
    /// Base URL of the upload API
    pub api_url: String,
    /// Bearer token
    pub api_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl HttpUploadConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_token: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let api_url = std::env::var("UPLOAD_API_URL")
            .map_err(|_| StorageError::config_error("UPLOAD_API_URL not set"))?;

        Ok(Self {
            api_url,
            api_token: std::env::var("UPLOAD_API_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("UPLOAD_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }
}

#[derive(Debug, Serialize)]
struct CreateUploadRequest<'a> {
    file_name: &'a str,
    content_type: &'a str,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct CreateUploadResponse {
    upload_id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct CompleteUploadResponse {
    asset_id: String,
}

/// Resumable transport over the HTTP upload API.
#[derive(Clone)]
pub struct HttpResumableTransport {
    http: Client,
    config: HttpUploadConfig,
}

impl HttpResumableTransport {
    pub fn new(config: HttpUploadConfig) -> StorageResult<Self> {
        // 308 is the protocol's "incomplete" reply, not a redirect.
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("clipflow-storage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StorageError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(HttpUploadConfig::from_env()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Parse the committed offset from a `Range: bytes=0-N` header.
    fn parse_committed_range(value: Option<&str>) -> StorageResult<u64> {
        let Some(value) = value else {
            return Ok(0);
        };
        let last = value
            .trim()
            .strip_prefix("bytes=0-")
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| {
                StorageError::protocol_violation(format!("malformed Range header: {}", value))
            })?;
        Ok(last + 1)
    }

    /// Error for a non-success reply.
    async fn error_from(response: Response) -> StorageError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        StorageError::from_http_reply(status, retry_after.as_deref(), body)
    }

    /// Interpret a chunk/offset reply as a committed offset.
    async fn committed_from_response(response: Response, total: u64) -> StorageResult<u64> {
        let status = response.status();
        match status.as_u16() {
            RESUME_INCOMPLETE => {
                let range = response
                    .headers()
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok());
                Self::parse_committed_range(range)
            }
            200 | 201 => Ok(total),
            _ => Err(Self::error_from(response).await),
        }
    }
}

#[async_trait]
impl UploadTransport for HttpResumableTransport {
    async fn create_session(&self, target: &UploadTarget) -> StorageResult<RemoteSession> {
        let url = self.url("/uploads");
        let request = CreateUploadRequest {
            file_name: &target.file_name,
            content_type: &target.content_type,
            size: target.total_bytes,
        };

        let response = self
            .authorize(self.http.post(&url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(match Self::error_from(response).await {
                e if e.is_transient() => e,
                e => StorageError::SessionCreateFailed(e.to_string()),
            });
        }

        let created: CreateUploadResponse = response.json().await?;
        info!(
            upload_id = %created.upload_id,
            file_name = %target.file_name,
            total_bytes = target.total_bytes,
            "Opened resumable upload session"
        );

        Ok(RemoteSession::new(created.upload_id, created.upload_url, target.total_bytes))
    }

    async fn upload_chunk(
        &self,
        session: &mut RemoteSession,
        range: ChunkRange,
        data: Vec<u8>,
    ) -> StorageResult<ChunkAck> {
        if data.len() as u64 != range.len || range.len == 0 {
            return Err(StorageError::protocol_violation(format!(
                "chunk {} carries {} bytes, expected {}",
                range.index,
                data.len(),
                range.len
            )));
        }

        let content_range = format!(
            "bytes {}-{}/{}",
            range.offset,
            range.end() - 1,
            session.total_bytes
        );
        debug!(upload_id = %session.upload_id, %content_range, "Sending chunk");

        let response = self
            .authorize(self.http.put(&session.location))
            .header(CONTENT_RANGE, content_range)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| {
                warn!(
                    upload_id = %session.upload_id,
                    offset = range.offset,
                    error = %e,
                    "Chunk transfer failed"
                );
                StorageError::chunk_failed(range.offset, e.to_string())
            })?;

        let committed_offset = Self::committed_from_response(response, session.total_bytes).await?;
        Ok(ChunkAck { committed_offset })
    }

    async fn committed_offset(&self, session: &mut RemoteSession) -> StorageResult<u64> {
        let response = self
            .authorize(self.http.put(&session.location))
            .header(CONTENT_RANGE, format!("bytes */{}", session.total_bytes))
            .body(Vec::new())
            .send()
            .await?;

        let committed = Self::committed_from_response(response, session.total_bytes).await?;
        debug!(upload_id = %session.upload_id, committed, "Queried committed offset");
        Ok(committed)
    }

    async fn finish(&self, session: &RemoteSession) -> StorageResult<StoredObject> {
        let url = self.url(&format!(
            "/uploads/{}/complete",
            urlencoding::encode(&session.upload_id)
        ));

        let response = self.authorize(self.http.post(&url)).send().await?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(match Self::error_from(response).await {
                e if e.is_transient() => e,
                e => StorageError::FinalizeFailed(e.to_string()),
            });
        }

        let completed: CompleteUploadResponse = response.json().await?;
        info!(upload_id = %session.upload_id, asset_id = %completed.asset_id, "Upload finalized");

        Ok(StoredObject {
            external_id: completed.asset_id,
        })
    }
}
