//! Platform REST API client.
//!
//! This crate provides:
//! - `MediaRegistry` for canonical media asset records
//! - `ClipStore` for clips produced by analysis jobs
//! - `CreditLedger` for balances and idempotent deductions
//! - A bearer-authenticated HTTP client with retry and metrics

pub mod client;
pub mod clip_repo;
pub mod credit_ledger;
pub mod error;
pub mod media_repo;
pub mod metrics;
pub mod retry;
pub mod sorting;


pub use client::{PlatformClient, PlatformConfig, IDEMPOTENCY_KEY_HEADER};
pub use clip_repo::{ClipRepository, ClipStore};
pub use credit_ledger::{CreditLedger, CreditLedgerRepository};
pub use error::{PlatformError, PlatformResult};
pub use media_repo::{MediaRegistry, MediaRepository};
pub use retry::RetryConfig;
pub use sorting::{sort_clips_by_start, sort_most_recent_first};
