//! Analysis job models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::media::MediaAssetId;

/// Unique identifier for an analysis job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
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

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status reported by the analysis service.
///
/// Deserialization is exhaustive: unknown strings are rejected at the
/// service boundary instead of being passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting for capacity
    #[default]
    #[serde(alias = "pending")]
    Queued,
    /// Being analyzed
    #[serde(alias = "processing")]
    Running,
    /// Clips are available
    #[serde(alias = "succeeded")]
    Completed,
    /// Analysis failed
    #[serde(alias = "error")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the status monotonic.
    ///
    /// Re-observing the same status is allowed; leaving a terminal status
    /// is not.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A remote, asynchronous unit of work that derives clips from a media asset.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisJob {
    /// Job ID assigned by the analysis service
    pub id: JobId,

    /// Asset being analyzed
    pub media_asset_id: MediaAssetId,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,

    /// First time the job was seen running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Terminal observation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    /// Create a freshly submitted job.
    pub fn new(id: JobId, media_asset_id: MediaAssetId) -> Self {
        let now = Utc::now();
        Self {
            id,
            media_asset_id,
            status: JobStatus::Queued,
            error_message: None,
            submitted_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    /// Apply an observed status.
    ///
    /// Returns `Ok(true)` if the status changed, `Ok(false)` for a repeat
    /// observation, and an error for a backward move.
    pub fn observe(
        &mut self,
        status: JobStatus,
        error_message: Option<String>,
    ) -> ModelResult<bool> {
        if !self.status.can_transition_to(status) {
            return Err(ModelError::IllegalStatusTransition {
                from: self.status,
                to: status,
            });
        }
        if self.status == status {
            return Ok(false);
        }

        let now = Utc::now();
        if status == JobStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.finished_at = Some(now);
        }
        if status == JobStatus::Failed {
            self.error_message = error_message;
        }
        self.status = status;
        self.updated_at = now;
        Ok(true)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_deserialization_aliases() {
        let s: JobStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(s, JobStatus::Running);
        let s: JobStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(s, JobStatus::Queued);
        assert!(serde_json::from_str::<JobStatus>("\"exploded\"").is_err());
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_job_observe() {
        let mut job = AnalysisJob::new(JobId::from("job-1"), MediaAssetId::from("asset-1"));

        assert!(job.observe(JobStatus::Running, None).unwrap());
        assert!(job.started_at.is_some());
        assert!(!job.observe(JobStatus::Running, None).unwrap());

        assert!(job
            .observe(JobStatus::Failed, Some("no speech detected".to_string()))
            .unwrap());
        assert_eq!(job.error_message.as_deref(), Some("no speech detected"));
        assert!(job.finished_at.is_some());

        assert!(job.observe(JobStatus::Running, None).is_err());
        assert_eq!(job.status, JobStatus::Failed);
    }
}
