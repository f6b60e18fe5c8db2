//! Media asset models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::upload::UploadResult;

/// Video MIME types accepted for analysis.
pub const ALLOWED_VIDEO_TYPES: &[&str] = &[
    "video/mp4",
    "video/quicktime",
    "video/webm",
    "video/x-matroska",
    "video/x-msvideo",
    "video/x-m4v",
];

/// Audio MIME types accepted for analysis.
pub const ALLOWED_AUDIO_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp4",
    "audio/wav",
    "audio/x-wav",
    "audio/webm",
    "audio/ogg",
    "audio/aac",
    "audio/flac",
    "audio/m4a",
    "audio/x-m4a",
];

/// Unique identifier for a registered media asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct MediaAssetId(pub String);

impl MediaAssetId {
    /// Generate a new random asset ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MediaAssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaAssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MediaAssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of source recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// Classify a MIME type against the allow-list.
    ///
    /// Parameters such as `; codecs=...` are ignored. Returns an error for
    /// anything that is not an accepted audio or video type.
    pub fn from_content_type(content_type: &str) -> ModelResult<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if ALLOWED_VIDEO_TYPES.contains(&essence.as_str()) {
            Ok(MediaKind::Video)
        } else if ALLOWED_AUDIO_TYPES.contains(&essence.as_str()) {
            Ok(MediaKind::Audio)
        } else {
            Err(ModelError::UnsupportedMediaType(content_type.to_string()))
        }
    }

    /// Guess the MIME type of a local file from its extension.
    pub fn guess_content_type(path: &Path) -> Option<String> {
        mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filter for media listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaFilter {
    #[default]
    All,
    Video,
    Audio,
}

impl MediaFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFilter::All => "all",
            MediaFilter::Video => "video",
            MediaFilter::Audio => "audio",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Some(MediaFilter::All),
            "video" => Some(MediaFilter::Video),
            "audio" => Some(MediaFilter::Audio),
            _ => None,
        }
    }

    /// The media kind this filter restricts to, if any.
    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            MediaFilter::All => None,
            MediaFilter::Video => Some(MediaKind::Video),
            MediaFilter::Audio => Some(MediaKind::Audio),
        }
    }

    pub fn matches(&self, kind: MediaKind) -> bool {
        self.kind().map_or(true, |k| k == kind)
    }
}

/// Ingest state of an asset on the storage side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    /// Upload finished, storage still preparing playback
    #[default]
    Preparing,
    /// Playable and eligible for analysis
    Ready,
    /// Storage rejected the upload
    Errored,
}

/// A single uploaded source recording eligible for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaAsset {
    /// Unique asset ID
    pub id: MediaAssetId,

    /// User ID (owner)
    pub user_id: String,

    /// Display name (usually the original file name)
    pub display_name: String,

    /// Audio or video
    pub kind: MediaKind,

    /// Stable identifier assigned by the storage service
    pub external_id: String,

    /// Playback URL of the full recording
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Thumbnail URL template with a `{time}` placeholder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url_template: Option<String>,

    /// Duration in seconds (enrichment field)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    /// File size in bytes
    #[serde(default)]
    pub size_bytes: u64,

    /// Ingest state (enrichment field)
    #[serde(default)]
    pub ingest_state: IngestState,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MediaAsset {
    /// Build the canonical record for a finished upload.
    pub fn from_upload(user_id: impl Into<String>, result: &UploadResult) -> ModelResult<Self> {
        let kind = MediaKind::from_content_type(&result.content_type)?;

        Ok(Self {
            id: MediaAssetId::new(),
            user_id: user_id.into(),
            display_name: result.file_name.clone(),
            kind,
            external_id: result.external_id.clone(),
            source_url: Some(result.playback_url.clone()),
            thumbnail_url_template: Some(result.thumbnail_url_template.clone()),
            duration_secs: result.duration_secs,
            size_bytes: result.size_bytes,
            ingest_state: IngestState::Preparing,
            created_at: Utc::now(),
            updated_at: None,
        })
    }

    /// The trimmed source URL, if it is present and parses as an absolute http(s) URL.
    pub fn resolvable_source(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .map(str::trim)
            .filter(|s| is_resolvable_url(s))
    }

    /// Whether the asset can be submitted for analysis.
    pub fn has_resolvable_source(&self) -> bool {
        self.resolvable_source().is_some()
    }
}

/// True if `candidate` is an absolute http(s) URL.
pub fn is_resolvable_url(candidate: &str) -> bool {
    match url::Url::parse(candidate.trim()) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_result(content_type: &str) -> UploadResult {
        UploadResult {
            external_id: "ext-1".to_string(),
            playback_url: "https://stream.example.com/ext-1.m3u8".to_string(),
            thumbnail_url_template: "https://image.example.com/ext-1/thumbnail.jpg?time={time}"
                .to_string(),
            file_name: "talk.mp4".to_string(),
            content_type: content_type.to_string(),
            size_bytes: 10 * 1024 * 1024,
            duration_secs: Some(120.0),
        }
    }

    #[test]
    fn test_media_kind_allow_list() {
        assert_eq!(MediaKind::from_content_type("video/mp4").unwrap(), MediaKind::Video);
        assert_eq!(
            MediaKind::from_content_type("audio/webm; codecs=opus").unwrap(),
            MediaKind::Audio
        );
        assert_eq!(MediaKind::from_content_type("VIDEO/QuickTime").unwrap(), MediaKind::Video);
        assert!(MediaKind::from_content_type("image/png").is_err());
        assert!(MediaKind::from_content_type("application/pdf").is_err());
    }

    #[test]
    fn test_guessed_m4a_and_m4v_are_accepted() {
        for (file, kind) in [("talk.m4a", MediaKind::Audio), ("talk.m4v", MediaKind::Video)] {
            let guessed = MediaKind::guess_content_type(Path::new(file)).unwrap();
            assert_eq!(MediaKind::from_content_type(&guessed).unwrap(), kind, "{}", file);
        }
        assert_eq!(MediaKind::from_content_type("audio/x-m4a").unwrap(), MediaKind::Audio);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(
            MediaKind::guess_content_type(Path::new("clip.mp4")).as_deref(),
            Some("video/mp4")
        );
        assert_eq!(MediaKind::guess_content_type(Path::new("no_extension")), None);
    }

    #[test]
    fn test_media_filter() {
        assert!(MediaFilter::All.matches(MediaKind::Audio));
        assert!(MediaFilter::Video.matches(MediaKind::Video));
        assert!(!MediaFilter::Video.matches(MediaKind::Audio));
        assert_eq!(MediaFilter::parse("Audio"), Some(MediaFilter::Audio));
        assert_eq!(MediaFilter::parse("images"), None);
    }

    #[test]
    fn test_asset_from_upload() {
        let asset = MediaAsset::from_upload("user-1", &upload_result("video/mp4")).unwrap();
        assert_eq!(asset.kind, MediaKind::Video);
        assert_eq!(asset.external_id, "ext-1");
        assert_eq!(asset.duration_secs, Some(120.0));
        assert!(asset.has_resolvable_source());
    }

    #[test]
    fn test_asset_from_upload_rejects_unknown_type() {
        assert!(MediaAsset::from_upload("user-1", &upload_result("text/plain")).is_err());
    }

    #[test]
    fn test_resolvable_source() {
        let mut asset = MediaAsset::from_upload("user-1", &upload_result("audio/mpeg")).unwrap();
        asset.source_url = Some("not a url".to_string());
        assert!(!asset.has_resolvable_source());
        asset.source_url = Some("ftp://files.example.com/a.mp3".to_string());
        assert!(!asset.has_resolvable_source());
        asset.source_url = None;
        assert!(!asset.has_resolvable_source());
    }

    #[test]
    fn test_resolvable_source_is_trimmed() {
        let mut asset = MediaAsset::from_upload("user-1", &upload_result("audio/mpeg")).unwrap();
        asset.source_url = Some("  https://cdn.example.com/a.mp3\n".to_string());
        assert_eq!(asset.resolvable_source(), Some("https://cdn.example.com/a.mp3"));
    }
}
