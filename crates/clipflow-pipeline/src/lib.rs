//! Media-to-clip generation pipeline.
//!
//! This crate drives one creator workflow end to end:
//! - Resumable, chunked upload of a local recording
//! - Registration of the resulting media asset
//! - Analysis job submission and bounded polling with pseudo-stage progress
//! - Exactly-once credit deduction per completed job
//! - Playable and thumbnail URL resolution for the generated clips
//!
//! [`Workflow`] is the entry point; everything else is usable on its own.

pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod progress;
pub mod resolver;
pub mod retry;
pub mod state_machine;
pub mod upload;
pub mod workflow;

#[cfg(test)]
mod fakes;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use ledger::{CreditLedgerAdapter, DeductionOutcome, ProcessedJobs};
pub use logging::WorkflowLogger;
pub use orchestrator::{JobOrchestrator, JobOutcome, JobTracker, Observation, SubmittedJob};
pub use progress::StageEstimator;
pub use resolver::{resolve_playable_url, resolve_thumbnail_url, resolve_views};
pub use state_machine::{PhaseEvent, ProcessingStateMachine};
pub use upload::{MediaFile, UploadCoordinator};
pub use workflow::{Workflow, WorkflowHandle, WorkflowInput, WorkflowOutcome, WorkflowServices};
