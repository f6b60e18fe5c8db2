//! Cloudflare R2 multipart transport.
//!
//! Each chunk becomes one multipart part (`part_number = index + 1`). The
//! committed offset is the byte length of the leading run of consecutive
//! parts, as reported by `ListParts`.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use aws_types::region::Region;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::transport::{
    ChunkAck, ChunkRange, PartReceipt, RemoteSession, StoredObject, UploadTarget, UploadTransport,
};

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("R2_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("R2_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Multipart upload transport for Cloudflare R2.
#[derive(Clone)]
pub struct R2MultipartTransport {
    client: Client,
    bucket: String,
}

impl R2MultipartTransport {
    /// Create a new transport from configuration.
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    /// Object key for an upload.
    pub fn object_key(file_name: &str) -> String {
        format!("uploads/{}/{}", Uuid::new_v4(), file_name)
    }

    /// Bytes covered by the leading run of consecutive parts starting at 1.
    pub fn contiguous_committed(parts: &[PartReceipt]) -> u64 {
        let mut sorted: Vec<&PartReceipt> = parts.iter().collect();
        sorted.sort_by_key(|p| p.part_number);

        let mut committed = 0;
        let mut expected = 1;
        for part in sorted {
            if part.part_number != expected {
                break;
            }
            committed += part.size;
            expected += 1;
        }
        committed
    }
}

#[async_trait]
impl UploadTransport for R2MultipartTransport {
    async fn create_session(&self, target: &UploadTarget) -> StorageResult<RemoteSession> {
        let key = Self::object_key(&target.file_name);

        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(&target.content_type)
            .send()
            .await
            .map_err(|e| StorageError::SessionCreateFailed(e.to_string()))?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| {
                StorageError::protocol_violation("multipart upload returned no upload ID")
            })?;

        info!(upload_id, key = %key, total_bytes = target.total_bytes, "Opened multipart upload");
        Ok(RemoteSession::new(upload_id, key, target.total_bytes))
    }

    async fn upload_chunk(
        &self,
        session: &mut RemoteSession,
        range: ChunkRange,
        data: Vec<u8>,
    ) -> StorageResult<ChunkAck> {
        let part_number = range.index as i32 + 1;
        debug!(upload_id = %session.upload_id, part_number, len = range.len, "Uploading part");

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&session.location)
            .upload_id(&session.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::chunk_failed(range.offset, e.to_string()))?;

        let etag = output
            .e_tag()
            .ok_or_else(|| StorageError::protocol_violation("part upload returned no ETag"))?
            .to_string();

        session.parts.retain(|p| p.part_number != part_number);
        session.parts.push(PartReceipt {
            part_number,
            etag,
            size: range.len,
        });

        Ok(ChunkAck {
            committed_offset: Self::contiguous_committed(&session.parts),
        })
    }

    async fn committed_offset(&self, session: &mut RemoteSession) -> StorageResult<u64> {
        let output = self
            .client
            .list_parts()
            .bucket(&self.bucket)
            .key(&session.location)
            .upload_id(&session.upload_id)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(e.to_string()))?;

        session.parts = output
            .parts()
            .iter()
            .filter_map(|p| {
                Some(PartReceipt {
                    part_number: p.part_number()?,
                    etag: p.e_tag()?.to_string(),
                    size: u64::try_from(p.size()?).ok()?,
                })
            })
            .collect();

        Ok(Self::contiguous_committed(&session.parts))
    }

    async fn finish(&self, session: &RemoteSession) -> StorageResult<StoredObject> {
        let mut parts = session.parts.clone();
        parts.sort_by_key(|p| p.part_number);

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .into_iter()
                    .map(|p| {
                        CompletedPart::builder()
                            .part_number(p.part_number)
                            .e_tag(p.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&session.location)
            .upload_id(&session.upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| StorageError::FinalizeFailed(e.to_string()))?;

        info!(
            upload_id = %session.upload_id,
            key = %session.location,
            "Multipart upload completed"
        );
        Ok(StoredObject {
            external_id: session.location.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(n: i32, size: u64) -> PartReceipt {
        PartReceipt {
            part_number: n,
            etag: format!("etag-{}", n),
            size,
        }
    }

    #[test]
    fn test_contiguous_committed() {
        assert_eq!(R2MultipartTransport::contiguous_committed(&[]), 0);
        assert_eq!(
            R2MultipartTransport::contiguous_committed(&[part(2, 5), part(1, 5)]),
            10
        );
        // Part 2 missing: only part 1 counts.
        assert_eq!(
            R2MultipartTransport::contiguous_committed(&[part(1, 5), part(3, 5)]),
            5
        );
        assert_eq!(R2MultipartTransport::contiguous_committed(&[part(2, 5)]), 0);
    }

    #[test]
    fn test_object_key_layout() {
        let key = R2MultipartTransport::object_key("talk.mp4");
        assert!(key.starts_with("uploads/"));
        assert!(key.ends_with("/talk.mp4"));
    }
}
