//! Credit balance and ledger models.
//!
//! Credits are metered per unit of AI-derived output and decremented from
//! a per-user balance exactly once per completed job. Every deduction is
//! keyed by an idempotency key derived from the job ID so the ledger can
//! recognise replays.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Per-user credit balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreditBalance {
    /// Remaining credits (integer units)
    pub balance: i64,
}

impl CreditBalance {
    pub fn new(balance: i64) -> Self {
        Self { balance }
    }

    /// Whether `units` can be spent without going negative.
    pub fn covers(&self, units: u32) -> bool {
        self.balance >= i64::from(units)
    }
}

/// Why credits are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    /// Clips generated by an analysis job
    ClipGeneration,
    /// Manual admin adjustment (refund, correction, etc.)
    AdminAdjustment,
}

impl CreditReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClipGeneration => "clip_generation",
            Self::AdminAdjustment => "admin_adjustment",
        }
    }

    /// Returns a human-readable label for the reason.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ClipGeneration => "Clip Generation",
            Self::AdminAdjustment => "Admin Adjustment",
        }
    }
}

/// A deduction sent to the credit ledger service.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeductionRequest {
    /// User being charged
    pub user_id: String,

    /// Job the charge belongs to
    pub job_id: JobId,

    /// Units to deduct
    pub units: u32,

    /// Why the credits are consumed
    pub reason: CreditReason,

    /// Replay-safe key (`job:{job_id}`)
    pub idempotency_key: String,

    /// Human-readable description
    pub description: String,

    /// Additional metadata (asset, clip count, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl DeductionRequest {
    /// Create a deduction for a completed job.
    pub fn for_job(
        user_id: impl Into<String>,
        job_id: &JobId,
        units: u32,
        reason: CreditReason,
    ) -> Self {
        let description = match units {
            1 => format!("{}: 1 clip", reason.label()),
            n => format!("{}: {} clips", reason.label(), n),
        };

        Self {
            user_id: user_id.into(),
            job_id: job_id.clone(),
            units,
            reason,
            idempotency_key: Self::idempotency_key_for(job_id),
            description,
            metadata: HashMap::new(),
        }
    }

    /// Idempotency key used for a job's deduction.
    pub fn idempotency_key_for(job_id: &JobId) -> String {
        format!("job:{}", job_id)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Ledger reply to a deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeductionReceipt {
    /// Ledger transaction ID
    pub transaction_id: String,

    /// Balance after the deduction
    pub new_balance: i64,

    /// True when the ledger recognised the idempotency key and did not charge again
    #[serde(default)]
    pub replayed: bool,
}

/// A credit transaction record.
///
/// Each time credits are charged, a transaction is recorded with the
/// operation details and resulting balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreditTransaction {
    /// Ledger transaction ID
    pub id: String,

    /// User who was charged
    pub user_id: String,

    /// Job that consumed the credits
    pub job_id: JobId,

    /// Why credits were consumed
    pub reason: CreditReason,

    /// Number of credits charged
    pub units: u32,

    /// Human-readable description
    pub description: String,

    /// Balance after this transaction
    pub balance_after: i64,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,

    /// When the transaction was recorded locally
    pub timestamp: DateTime<Utc>,
}

impl CreditTransaction {
    /// Build the local record for an accepted deduction.
    pub fn from_receipt(request: &DeductionRequest, receipt: &DeductionReceipt) -> Self {
        Self {
            id: receipt.transaction_id.clone(),
            user_id: request.user_id.clone(),
            job_id: request.job_id.clone(),
            reason: request.reason,
            units: request.units,
            description: request.description.clone(),
            balance_after: receipt.new_balance,
            metadata: request.metadata.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_covers() {
        let balance = CreditBalance::new(10);
        assert!(balance.covers(10));
        assert!(!balance.covers(15));
        assert!(!CreditBalance::new(-2).covers(0));
    }

    #[test]
    fn test_deduction_for_job() {
        let job_id = JobId::from("job-42");
        let req = DeductionRequest::for_job("user-1", &job_id, 5, CreditReason::ClipGeneration)
            .with_metadata("clip_count", "5");

        assert_eq!(req.idempotency_key, "job:job-42");
        assert_eq!(req.description, "Clip Generation: 5 clips");
        assert_eq!(req.metadata.get("clip_count"), Some(&"5".to_string()));

        let single = DeductionRequest::for_job("user-1", &job_id, 1, CreditReason::ClipGeneration);
        assert_eq!(single.description, "Clip Generation: 1 clip");
    }

    #[test]
    fn test_transaction_from_receipt() {
        let job_id = JobId::from("job-42");
        let req = DeductionRequest::for_job("user-1", &job_id, 5, CreditReason::ClipGeneration);
        let receipt = DeductionReceipt {
            transaction_id: "tx-1".to_string(),
            new_balance: 95,
            replayed: false,
        };

        let tx = CreditTransaction::from_receipt(&req, &receipt);
        assert_eq!(tx.id, "tx-1");
        assert_eq!(tx.units, 5);
        assert_eq!(tx.balance_after, 95);
        assert_eq!(tx.reason, CreditReason::ClipGeneration);
    }

    #[test]
    fn test_receipt_replayed_defaults_false() {
        let receipt: DeductionReceipt =
            serde_json::from_str(r#"{"transaction_id":"tx","new_balance":3}"#).unwrap();
        assert!(!receipt.replayed);
    }
}
