//! Clip store.

use async_trait::async_trait;
use tracing::debug;

use clipflow_models::{Clip, JobId, MediaAssetId};

use crate::client::PlatformClient;
use crate::error::PlatformResult;
use crate::media_repo::ListResponse;
use crate::sorting::sort_clips_by_start;

/// Read access to clips produced by analysis jobs.
#[async_trait]
pub trait ClipStore: Send + Sync {
    /// Clips produced by one job.
    async fn list_for_job(&self, job_id: &JobId) -> PlatformResult<Vec<Clip>>;

    /// All clips cut from an asset, across jobs.
    async fn list_for_asset(&self, asset_id: &MediaAssetId) -> PlatformResult<Vec<Clip>>;
}

/// REST-backed clip store.
#[derive(Clone)]
pub struct ClipRepository {
    client: PlatformClient,
}

impl ClipRepository {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, operation: &str, path: &str) -> PlatformResult<Vec<Clip>> {
        let response: ListResponse<Clip> = self.client.get_json(operation, path, &[]).await?;
        let mut clips = response.items;
        sort_clips_by_start(&mut clips);
        debug!(operation, count = clips.len(), "Fetched clips");
        Ok(clips)
    }
}

#[async_trait]
impl ClipStore for ClipRepository {
    async fn list_for_job(&self, job_id: &JobId) -> PlatformResult<Vec<Clip>> {
        let path = format!("/jobs/{}/clips", urlencoding::encode(job_id.as_str()));
        self.fetch("list_job_clips", &path).await
    }

    async fn list_for_asset(&self, asset_id: &MediaAssetId) -> PlatformResult<Vec<Clip>> {
        let path = format!("/media/{}/clips", urlencoding::encode(asset_id.as_str()));
        self.fetch("list_asset_clips", &path).await
    }
}
