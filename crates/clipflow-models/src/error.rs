//! Model-level error types.

use thiserror::Error;

use crate::job::JobStatus;

/// Result type for model invariants.
pub type ModelResult<T> = Result<T, ModelError>;

/// Violations of data-model invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Illegal job status transition: {from} -> {to}")]
    IllegalStatusTransition { from: JobStatus, to: JobStatus },

    #[error("Upload offset regressed: acknowledged {acknowledged}, received {received}")]
    OffsetRegressed { acknowledged: u64, received: u64 },

    #[error("Upload offset {offset} exceeds total size {total}")]
    OffsetOverflow { offset: u64, total: u64 },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid clip range: {0}")]
    InvalidClipRange(String),
}
