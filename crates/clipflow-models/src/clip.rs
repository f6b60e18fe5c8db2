//! Generated clip models and gallery view-models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::job::JobId;
use crate::media::MediaAssetId;

/// Rendering status of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    /// Segment selected, rendering not started
    #[default]
    Pending,
    /// Artifact is being rendered
    #[serde(alias = "processing")]
    Rendering,
    /// Artifact is available
    #[serde(alias = "completed")]
    Ready,
    /// Rendering failed
    Failed,
}

impl ClipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipStatus::Pending => "pending",
            ClipStatus::Rendering => "rendering",
            ClipStatus::Ready => "ready",
            ClipStatus::Failed => "failed",
        }
    }
}

/// A short derivative segment of a media asset produced by a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    /// Unique clip ID
    pub id: String,

    /// Job that produced this clip
    pub job_id: JobId,

    /// Asset this clip was cut from
    pub media_asset_id: MediaAssetId,

    /// Start offset in seconds
    pub start_secs: f64,

    /// End offset in seconds
    pub end_secs: f64,

    /// Clip title
    #[serde(default)]
    pub title: String,

    /// Suggested caption
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// Virality score assigned by the analysis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Rendering status
    #[serde(default)]
    pub status: ClipStatus,

    /// Rendered artifact URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,

    /// Externally hosted copy of the clip (e.g. published to a platform)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,

    /// Thumbnail URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    /// Error message (if rendering failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Clip {
    /// Create a pending clip for a segment of an asset.
    pub fn new(
        id: impl Into<String>,
        job_id: JobId,
        media_asset_id: MediaAssetId,
        start_secs: f64,
        end_secs: f64,
        title: impl Into<String>,
    ) -> ModelResult<Self> {
        if !(start_secs >= 0.0 && end_secs > start_secs) {
            return Err(ModelError::InvalidClipRange(format!(
                "{:.3}..{:.3}",
                start_secs, end_secs
            )));
        }

        Ok(Self {
            id: id.into(),
            job_id,
            media_asset_id,
            start_secs,
            end_secs,
            title: title.into(),
            caption: None,
            score: None,
            status: ClipStatus::Pending,
            artifact_url: None,
            external_url: None,
            thumbnail_url: None,
            error_message: None,
            created_at: Utc::now(),
        })
    }

    /// Set the rendered artifact and mark the clip ready.
    pub fn with_artifact(mut self, url: impl Into<String>) -> Self {
        self.artifact_url = Some(url.into());
        self.status = ClipStatus::Ready;
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }
}

/// Result of resolving a playable URL for a clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum Playable {
    /// A URL the player can load
    Url(String),
    /// Nothing resolvable yet (e.g. clip still rendering)
    NotAvailable,
}

impl Playable {
    pub fn url(&self) -> Option<&str> {
        match self {
            Playable::Url(u) => Some(u),
            Playable::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Playable::Url(_))
    }
}

/// Gallery view-model for a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClipView {
    pub clip_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub start_secs: f64,
    pub end_secs: f64,
    pub status: ClipStatus,
    pub playable: Playable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}
