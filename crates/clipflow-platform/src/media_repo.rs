//! Media asset registry.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use clipflow_models::{MediaAsset, MediaAssetId, MediaFilter, UploadResult};

use crate::client::{PlatformClient, IDEMPOTENCY_KEY_HEADER};
use crate::error::{PlatformError, PlatformResult};
use crate::sorting::sort_most_recent_first;

/// Canonical store of media asset records.
///
/// Pure persistence and query; never touches credit balances.
#[async_trait]
pub trait MediaRegistry: Send + Sync {
    /// Register the asset produced by a finished upload.
    async fn create_from_upload(
        &self,
        user_id: &str,
        result: &UploadResult,
    ) -> PlatformResult<MediaAsset>;

    /// Snapshot of a user's assets, most recent first.
    async fn list(&self, user_id: &str, filter: MediaFilter) -> PlatformResult<Vec<MediaAsset>>;

    /// Fetch one asset; `NotFound` if it does not exist.
    async fn get(&self, id: &MediaAssetId) -> PlatformResult<MediaAsset>;
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// REST-backed media registry.
#[derive(Clone)]
pub struct MediaRepository {
    client: PlatformClient,
}

impl MediaRepository {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }

    /// One stored object registers as one asset, however often the write is retried.
    pub fn registration_key(result: &UploadResult) -> String {
        format!("media:{}", result.external_id)
    }
}

#[async_trait]
impl MediaRegistry for MediaRepository {
    async fn create_from_upload(
        &self,
        user_id: &str,
        result: &UploadResult,
    ) -> PlatformResult<MediaAsset> {
        let asset = MediaAsset::from_upload(user_id, result)?;
        let key = Self::registration_key(result);

        let created: MediaAsset = self
            .client
            .post_json(
                "create_media_asset",
                "/media",
                &asset,
                &[(IDEMPOTENCY_KEY_HEADER, key.as_str())],
            )
            .await?;

        info!(
            asset_id = %created.id,
            user_id = %user_id,
            external_id = %created.external_id,
            kind = %created.kind,
            "Registered media asset"
        );
        Ok(created)
    }

    async fn list(&self, user_id: &str, filter: MediaFilter) -> PlatformResult<Vec<MediaAsset>> {
        let path = format!("/users/{}/media", urlencoding::encode(user_id));
        let query: Vec<(&str, &str)> = match filter.kind() {
            Some(kind) => vec![("kind", kind.as_str())],
            None => Vec::new(),
        };

        let response: ListResponse<MediaAsset> =
            self.client.get_json("list_media_assets", &path, &query).await?;

        let mut assets: Vec<MediaAsset> = response
            .items
            .into_iter()
            .filter(|a| filter.matches(a.kind))
            .collect();
        sort_most_recent_first(&mut assets);
        Ok(assets)
    }

    async fn get(&self, id: &MediaAssetId) -> PlatformResult<MediaAsset> {
        let path = format!("/media/{}", urlencoding::encode(id.as_str()));
        match self.client.get_json("get_media_asset", &path, &[]).await {
            Err(PlatformError::NotFound(_)) => {
                Err(PlatformError::not_found(format!("media asset {}", id)))
            }
            other => other,
        }
    }
}
