//! Client for the media analysis job service.
//!
//! The service accepts a source URL and duration, returns a job ID (or an
//! immediate terminal result), and reports job status on request. The
//! analysis model itself lives behind this boundary.

pub mod client;
pub mod error;
pub mod types;

pub use client::{AnalysisClient, AnalysisClientConfig, AnalysisService};
pub use error::{AnalysisError, AnalysisResult};
pub use types::{AnalysisRequest, HealthResponse, JobStatusReport, JobTiming, SubmitResponse};
