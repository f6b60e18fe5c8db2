//! Structured workflow logging utilities.

use tracing::{error, info, warn, Span};

use clipflow_models::WorkflowId;

/// Workflow logger for structured logging with consistent formatting.
///
/// Every line carries the workflow ID, the user and the operation.
#[derive(Debug, Clone)]
pub struct WorkflowLogger {
    workflow_id: String,
    user_id: String,
    operation: String,
}

impl WorkflowLogger {
    /// Create a new logger for a workflow run.
    pub fn new(workflow_id: &WorkflowId, user_id: &str, operation: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            user_id: user_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            workflow_id = %self.workflow_id,
            user_id = %self.user_id,
            operation = %self.operation,
            "Workflow started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            workflow_id = %self.workflow_id,
            user_id = %self.user_id,
            operation = %self.operation,
            "Workflow progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            workflow_id = %self.workflow_id,
            user_id = %self.user_id,
            operation = %self.operation,
            "Workflow warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            workflow_id = %self.workflow_id,
            user_id = %self.user_id,
            operation = %self.operation,
            "Workflow error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            workflow_id = %self.workflow_id,
            user_id = %self.user_id,
            operation = %self.operation,
            "Workflow completed: {}", message
        );
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this workflow run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "workflow",
            workflow_id = %self.workflow_id,
            user_id = %self.user_id,
            operation = %self.operation
        )
    }
}
