//! Shared data models for the clipflow pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Media assets and upload sessions
//! - Analysis jobs and their monotonic status
//! - Generated clips and gallery view-models
//! - Credit balances, cost estimates and ledger transactions
//! - Workflow phases and progress events

pub mod clip;
pub mod credit;
pub mod credit_cost;
pub mod error;
pub mod job;
pub mod media;
pub mod upload;
pub mod workflow;

// Re-export common types
pub use clip::{Clip, ClipStatus, ClipView, Playable};
pub use credit::{
    CreditBalance, CreditReason, CreditTransaction, DeductionReceipt, DeductionRequest,
};
pub use credit_cost::{AnalysisCostEstimator, CostEstimate};
pub use error::{ModelError, ModelResult};
pub use job::{AnalysisJob, JobId, JobStatus};
pub use media::{is_resolvable_url, IngestState, MediaAsset, MediaAssetId, MediaFilter, MediaKind};
pub use upload::{UploadResult, UploadSession, UploadStatus};
pub use workflow::{ProcessingStage, WorkflowEvent, WorkflowId, WorkflowPhase};
