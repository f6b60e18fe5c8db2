//! Workflow phase state machine.
//!
//! ```text
//! Intake ──StartUpload──▶ Uploading ──JobSubmitted──▶ Processing ──JobCompleted──▶ Gallery
//!   │  ▲                      │                          │                          │
//!   │  └──── failure / cancel ┴──────────────────────────┘                          │
//!   │  ▲                                                                           │
//!   │  └────────────────────────────── GenerateMore ◀─────────────────────────────┘
//!   └── SelectExisting (clips exist, nothing submitted) ──▶ Gallery
//! ```
//!
//! Once a job has been submitted for the selected asset, Gallery is only
//! reachable through that job's `completed` observation.

use std::fmt;

use tracing::debug;

use clipflow_models::{JobId, MediaAsset, WorkflowPhase};

use crate::error::{PipelineError, PipelineResult, CANCELLED_MESSAGE};

/// Inputs to the state machine.
#[derive(Debug, Clone)]
pub enum PhaseEvent {
    /// A file upload begins.
    StartUpload,
    /// Upload finished and the asset is registered.
    UploadCompleted(MediaAsset),
    /// Upload or registration failed.
    UploadFailed(String),
    /// A previously registered asset is selected.
    SelectExisting { asset: MediaAsset, has_clips: bool },
    /// The analysis service accepted a job for the selected asset.
    JobSubmitted(JobId),
    /// Submission was refused (validation, credits, service error).
    SubmissionRejected(String),
    /// The submitted job was observed `completed`.
    JobCompleted(JobId),
    /// The submitted job was observed `failed`.
    JobFailed(String),
    /// Polling exceeded its bound.
    JobTimedOut(String),
    /// Leave the gallery to submit another job for the same asset.
    GenerateMore,
    /// The user abandoned the workflow.
    Cancelled,
}

impl PhaseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PhaseEvent::StartUpload => "start_upload",
            PhaseEvent::UploadCompleted(_) => "upload_completed",
            PhaseEvent::UploadFailed(_) => "upload_failed",
            PhaseEvent::SelectExisting { .. } => "select_existing",
            PhaseEvent::JobSubmitted(_) => "job_submitted",
            PhaseEvent::SubmissionRejected(_) => "submission_rejected",
            PhaseEvent::JobCompleted(_) => "job_completed",
            PhaseEvent::JobFailed(_) => "job_failed",
            PhaseEvent::JobTimedOut(_) => "job_timed_out",
            PhaseEvent::GenerateMore => "generate_more",
            PhaseEvent::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Governs workflow phases and owns error recovery state.
#[derive(Debug, Clone, Default)]
pub struct ProcessingStateMachine {
    phase: WorkflowPhase,
    asset: Option<MediaAsset>,
    active_job: Option<JobId>,
    job_submitted_for_asset: bool,
    last_error: Option<String>,
}

impl ProcessingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    /// Asset currently selected; retained across failures.
    pub fn asset(&self) -> Option<&MediaAsset> {
        self.asset.as_ref()
    }

    /// Job being processed, if any.
    pub fn active_job(&self) -> Option<&JobId> {
        self.active_job.as_ref()
    }

    /// Message attached on the last return to Intake.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a job has been submitted for the selected asset.
    pub fn job_submitted_for_asset(&self) -> bool {
        self.job_submitted_for_asset
    }

    /// Apply an event and return the new phase.
    ///
    /// Illegal events leave the state untouched.
    pub fn apply(&mut self, event: PhaseEvent) -> PipelineResult<WorkflowPhase> {
        use PhaseEvent as E;
        use WorkflowPhase as P;

        let from = self.phase;
        let name = event.name();

        match (from, event) {
            (P::Intake, E::StartUpload) => {
                self.last_error = None;
                self.phase = P::Uploading;
            }
            (P::Uploading, E::UploadCompleted(asset)) => {
                self.select(asset);
            }
            (P::Uploading, E::UploadFailed(message)) => {
                self.return_to_intake(message);
            }
            (P::Intake, E::SelectExisting { asset, has_clips }) => {
                self.select(asset);
                self.last_error = None;
                if has_clips && !self.job_submitted_for_asset {
                    self.phase = P::Gallery;
                }
            }
            (P::Intake | P::Uploading, E::JobSubmitted(job_id)) => {
                if self.asset.is_none() {
                    return Err(PipelineError::invalid_transition(
                        from,
                        "job_submitted without an asset",
                    ));
                }
                self.active_job = Some(job_id);
                self.job_submitted_for_asset = true;
                self.last_error = None;
                self.phase = P::Processing;
            }
            (P::Intake | P::Uploading, E::SubmissionRejected(message)) => {
                self.return_to_intake(message);
            }
            (P::Processing, E::JobCompleted(job_id)) => {
                if self.active_job.as_ref() != Some(&job_id) {
                    return Err(PipelineError::invalid_transition(
                        from,
                        format!("job_completed for unknown job {}", job_id),
                    ));
                }
                self.active_job = None;
                self.phase = P::Gallery;
            }
            (P::Processing, E::JobFailed(message) | E::JobTimedOut(message)) => {
                self.active_job = None;
                self.return_to_intake(message);
            }
            (P::Gallery, E::GenerateMore) => {
                self.last_error = None;
                self.phase = P::Intake;
            }
            (P::Uploading | P::Processing, E::Cancelled) => {
                self.active_job = None;
                self.return_to_intake(CANCELLED_MESSAGE.to_string());
            }
            (from, _) => return Err(PipelineError::invalid_transition(from, name)),
        }

        debug!(from = %from, to = %self.phase, event = name, "Workflow transition");
        Ok(self.phase)
    }

    fn select(&mut self, asset: MediaAsset) {
        let same_asset = self.asset.as_ref().map(|a| &a.id) == Some(&asset.id);
        if !same_asset {
            self.job_submitted_for_asset = false;
        }
        self.asset = Some(asset);
    }

    fn return_to_intake(&mut self, message: String) {
        self.last_error = Some(message);
        self.phase = WorkflowPhase::Intake;
    }
}
