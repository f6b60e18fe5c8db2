//! Workflow phases and progress events.
//!
//! Events are what the surrounding application renders; they carry the
//! phase, a percentage, a user-facing stage label and an optional error.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a workflow instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workflow phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    /// No workflow in progress
    #[default]
    Intake,
    /// Upload coordinator active
    Uploading,
    /// Job orchestrator active
    Processing,
    /// Results are browsable
    Gallery,
}

impl WorkflowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Intake => "intake",
            WorkflowPhase::Uploading => "uploading",
            WorkflowPhase::Processing => "processing",
            WorkflowPhase::Gallery => "gallery",
        }
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pseudo-stage shown while a job is processing.
///
/// Derived from elapsed poll attempts, not from server-reported progress.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Transcribing,
    Analyzing,
    Detecting,
    Scoring,
    Generating,
    Finalizing,
}

impl ProcessingStage {
    /// All stages in display order.
    pub const ALL: [ProcessingStage; 6] = [
        ProcessingStage::Transcribing,
        ProcessingStage::Analyzing,
        ProcessingStage::Detecting,
        ProcessingStage::Scoring,
        ProcessingStage::Generating,
        ProcessingStage::Finalizing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Transcribing => "transcribing",
            ProcessingStage::Analyzing => "analyzing",
            ProcessingStage::Detecting => "detecting",
            ProcessingStage::Scoring => "scoring",
            ProcessingStage::Generating => "generating",
            ProcessingStage::Finalizing => "finalizing",
        }
    }

    /// User-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingStage::Transcribing => "Transcribing audio",
            ProcessingStage::Analyzing => "Analyzing content",
            ProcessingStage::Detecting => "Detecting key moments",
            ProcessingStage::Scoring => "Scoring highlights",
            ProcessingStage::Generating => "Generating clips",
            ProcessingStage::Finalizing => "Finalizing",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Progress event emitted to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    /// Phase the workflow is in
    pub phase: WorkflowPhase,

    /// Progress within the phase (0-100)
    pub progress_percent: u8,

    /// User-facing stage label
    pub stage_label: String,

    /// Error message attached on return to Intake
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Emission timestamp
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(phase: WorkflowPhase, progress_percent: u8, stage_label: impl Into<String>) -> Self {
        Self {
            phase,
            progress_percent: progress_percent.min(100),
            stage_label: stage_label.into(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Upload progress.
    pub fn uploading(progress_percent: u8) -> Self {
        Self::new(WorkflowPhase::Uploading, progress_percent, "Uploading")
    }

    /// Processing progress at a pseudo-stage.
    pub fn processing(stage: ProcessingStage, progress_percent: u8) -> Self {
        Self::new(WorkflowPhase::Processing, progress_percent, stage.label())
    }

    /// Terminal success.
    pub fn gallery(clip_count: usize) -> Self {
        let label = match clip_count {
            1 => "1 clip ready".to_string(),
            n => format!("{} clips ready", n),
        };
        Self::new(WorkflowPhase::Gallery, 100, label)
    }

    /// Terminal failure; the workflow is back at Intake.
    pub fn failed(message: impl Into<String>) -> Self {
        let mut event = Self::new(WorkflowPhase::Intake, 0, "Failed");
        event.error = Some(message.into());
        event
    }

    /// Whether this event ends a subscription.
    pub fn is_terminal(&self) -> bool {
        self.phase == WorkflowPhase::Gallery || self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let labels: Vec<_> = ProcessingStage::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            labels,
            vec!["transcribing", "analyzing", "detecting", "scoring", "generating", "finalizing"]
        );
        assert!(ProcessingStage::Scoring > ProcessingStage::Detecting);
        assert_eq!(ProcessingStage::Finalizing.index(), 5);
    }

    #[test]
    fn test_event_serialization() {
        let event = WorkflowEvent::processing(ProcessingStage::Detecting, 40);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"phase\":\"processing\""));
        assert!(json.contains("\"progressPercent\":40"));
        assert!(json.contains("\"stageLabel\":\"Detecting key moments\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_terminal_events() {
        assert!(WorkflowEvent::gallery(5).is_terminal());
        assert_eq!(WorkflowEvent::gallery(1).stage_label, "1 clip ready");

        let failed = WorkflowEvent::failed("no speech detected");
        assert!(failed.is_terminal());
        assert_eq!(failed.phase, WorkflowPhase::Intake);
        assert_eq!(failed.error.as_deref(), Some("no speech detected"));

        assert!(!WorkflowEvent::uploading(150).is_terminal());
        assert_eq!(WorkflowEvent::uploading(150).progress_percent, 100);
    }
}
