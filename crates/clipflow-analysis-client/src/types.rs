//! Analysis service request/response types.
//!
//! Status values are the closed `JobStatus` enumeration; a payload carrying
//! anything else fails to deserialize here rather than leaking inward.

use serde::{Deserialize, Serialize};

use clipflow_models::{JobId, JobStatus, MediaAssetId};

/// Request to analyze a media asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Asset being analyzed
    pub media_asset_id: MediaAssetId,
    /// Resolvable source URL
    pub source_url: String,
    /// Duration in seconds, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Upper bound on clips to produce
    pub max_clips: u32,
}

/// Reply to a submission.
///
/// A terminal `status` means the service answered synchronously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    #[serde(alias = "job_id")]
    pub job_id: JobId,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, alias = "error_message", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SubmitResponse {
    pub fn is_synchronous(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Timing information attached to a status report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTiming {
    /// Seconds since the job was accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
    /// Server estimate of remaining seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_secs: Option<f64>,
}

/// Status endpoint reply: `{status, errorMessage, timing}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default, alias = "error_message", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<JobTiming>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_report_parsing() {
        let report: JobStatusReport = serde_json::from_value(serde_json::json!({
            "status": "failed",
            "errorMessage": "no speech detected",
            "timing": { "elapsedSecs": 12.5 }
        }))
        .unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.error_message.as_deref(), Some("no speech detected"));
        assert_eq!(report.timing.unwrap().elapsed_secs, Some(12.5));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(serde_json::from_str::<JobStatusReport>(r#"{"status":"exploded"}"#).is_err());
    }

    #[test]
    fn test_submit_response_synchronous() {
        let resp: SubmitResponse =
            serde_json::from_str(r#"{"job_id":"job-1","status":"completed"}"#).unwrap();
        assert!(resp.is_synchronous());

        let resp: SubmitResponse = serde_json::from_str(r#"{"jobId":"job-2"}"#).unwrap();
        assert_eq!(resp.status, JobStatus::Queued);
        assert!(!resp.is_synchronous());
    }
}
