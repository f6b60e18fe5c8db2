//! Upload session models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ModelError, ModelResult};

/// Status of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Session created locally, no remote handle yet
    #[default]
    Pending,
    /// Chunks are being transferred
    Uploading,
    /// All bytes acknowledged and the remote object finalized
    Completed,
    /// Upload gave up
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }
}

/// Transfer state of one local file.
///
/// `bytes_uploaded` only ever grows and never exceeds `total_bytes`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UploadSession {
    /// Local file being transferred
    pub file_path: PathBuf,

    /// File name presented to storage
    pub file_name: String,

    /// Validated MIME type
    pub content_type: String,

    /// Bytes acknowledged by the remote side
    pub bytes_uploaded: u64,

    /// Size of the file
    pub total_bytes: u64,

    /// Remote upload-session handle (upload URL or multipart upload ID)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_handle: Option<String>,

    /// Number of chunk acknowledgements received
    #[serde(default)]
    pub chunks_acknowledged: u32,

    /// Session status
    #[serde(default)]
    pub status: UploadStatus,

    /// When the session was opened
    pub started_at: DateTime<Utc>,
}

impl UploadSession {
    /// Create a pending session for a validated file.
    pub fn new(
        file_path: impl Into<PathBuf>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        total_bytes: u64,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes_uploaded: 0,
            total_bytes,
            remote_handle: None,
            chunks_acknowledged: 0,
            status: UploadStatus::Pending,
            started_at: Utc::now(),
        }
    }

    /// Attach the remote handle and move to `Uploading`.
    pub fn attach(&mut self, remote_handle: impl Into<String>) {
        self.remote_handle = Some(remote_handle.into());
        self.status = UploadStatus::Uploading;
    }

    /// Record a committed offset reported by the remote side.
    pub fn acknowledge(&mut self, committed_offset: u64) -> ModelResult<()> {
        if committed_offset > self.total_bytes {
            return Err(ModelError::OffsetOverflow {
                offset: committed_offset,
                total: self.total_bytes,
            });
        }
        if committed_offset < self.bytes_uploaded {
            return Err(ModelError::OffsetRegressed {
                acknowledged: self.bytes_uploaded,
                received: committed_offset,
            });
        }

        self.bytes_uploaded = committed_offset;
        self.chunks_acknowledged += 1;
        Ok(())
    }

    /// Transfer progress (0-100), monotonic with `bytes_uploaded`.
    pub fn progress_percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        ((self.bytes_uploaded as u128 * 100) / self.total_bytes as u128) as u8
    }

    pub fn is_fully_acknowledged(&self) -> bool {
        self.bytes_uploaded == self.total_bytes
    }

    pub fn complete(&mut self) {
        self.status = UploadStatus::Completed;
    }

    pub fn fail(&mut self) {
        self.status = UploadStatus::Failed;
    }

    /// True while the session still owns the coordinator's slot.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Outcome of a finished upload: a stable external identifier plus the
/// playback/thumbnail URLs derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UploadResult {
    /// Stable identifier assigned by the storage service
    pub external_id: String,

    /// Playback URL for the whole recording
    pub playback_url: String,

    /// Thumbnail URL template with a `{time}` placeholder
    pub thumbnail_url_template: String,

    /// Original file name
    pub file_name: String,

    /// MIME type
    pub content_type: String,

    /// Size in bytes
    pub size_bytes: u64,

    /// Duration in seconds, if known by the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledge_is_monotonic() {
        let mut session = UploadSession::new("/tmp/a.mp4", "a.mp4", "video/mp4", 100);
        session.attach("upload-1");
        assert_eq!(session.status, UploadStatus::Uploading);

        session.acknowledge(40).unwrap();
        assert_eq!(session.progress_percent(), 40);

        let err = session.acknowledge(30).unwrap_err();
        assert_eq!(
            err,
            ModelError::OffsetRegressed {
                acknowledged: 40,
                received: 30
            }
        );
        assert_eq!(session.bytes_uploaded, 40);

        session.acknowledge(100).unwrap();
        assert!(session.is_fully_acknowledged());
        assert_eq!(session.chunks_acknowledged, 2);
    }

    #[test]
    fn test_acknowledge_rejects_overflow() {
        let mut session = UploadSession::new("/tmp/a.mp4", "a.mp4", "video/mp4", 100);
        assert!(matches!(
            session.acknowledge(101),
            Err(ModelError::OffsetOverflow { .. })
        ));
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = UploadSession::new("/tmp/a.mp3", "a.mp3", "audio/mpeg", 10);
        assert!(session.is_active());
        session.complete();
        assert!(!session.is_active());
    }
}
