//! Pipeline error types.

use thiserror::Error;

use clipflow_analysis_client::AnalysisError;
use clipflow_models::{ModelError, WorkflowPhase};
use clipflow_platform::PlatformError;
use clipflow_storage::StorageError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Shown when a job fails without a message from the analysis service.
pub const GENERIC_FAILURE_MESSAGE: &str = "Analysis failed. Please try again.";

/// Shown when polling exceeds its attempt bound.
pub const TIMEOUT_MESSAGE: &str = "Analysis is taking longer than expected. Please try again.";

/// Shown when the user abandons the workflow.
pub const CANCELLED_MESSAGE: &str = "Cancelled";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("An upload is already in progress")]
    UploadInProgress,

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Insufficient credits: {required} required, {balance} available")]
    InsufficientCredits { required: u32, balance: i64 },

    #[error("Analysis failed: {0}")]
    RemoteJobFailure(String),

    #[error("Analysis timed out after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Cannot apply {event} in phase {from}")]
    InvalidTransition { from: WorkflowPhase, event: String },

    #[error("Workflow is busy: {0}")]
    WorkflowBusy(String),

    #[error("Workflow task failed: {0}")]
    TaskFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Analysis service error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn invalid_transition(from: WorkflowPhase, event: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from,
            event: event.into(),
        }
    }

    /// Rejected before any remote call was made.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_)
                | PipelineError::InsufficientCredits { .. }
                | PipelineError::UploadInProgress
        )
    }

    /// Text attached to the Intake phase when a workflow fails.
    ///
    /// Remote job failures pass the service's message through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::RemoteJobFailure(msg) => msg.clone(),
            PipelineError::Timeout { .. } => TIMEOUT_MESSAGE.to_string(),
            PipelineError::Cancelled => CANCELLED_MESSAGE.to_string(),
            PipelineError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_passes_remote_failure_through() {
        let err = PipelineError::RemoteJobFailure("no speech detected".to_string());
        assert_eq!(err.user_message(), "no speech detected");
    }

    #[test]
    fn test_user_message_for_credits() {
        let err = PipelineError::InsufficientCredits {
            required: 15,
            balance: 10,
        };
        assert_eq!(err.user_message(), "Insufficient credits: 15 required, 10 available");
        assert!(err.is_preflight());
    }

    #[test]
    fn test_timeout_and_cancel_messages() {
        assert_eq!(PipelineError::Timeout { attempts: 60 }.user_message(), TIMEOUT_MESSAGE);
        assert_eq!(PipelineError::Cancelled.user_message(), "Cancelled");
    }
}
