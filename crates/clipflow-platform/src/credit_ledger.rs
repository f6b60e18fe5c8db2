//! Credit ledger service client.
//!
//! Deductions are atomic on the ledger side and keyed by a caller-supplied
//! idempotency key, so a retried request never charges twice. A replayed
//! deduction comes back with `replayed = true` and the balance unchanged.

use async_trait::async_trait;
use tracing::{info, warn};

use clipflow_models::{CreditBalance, DeductionReceipt, DeductionRequest};

use crate::client::{PlatformClient, IDEMPOTENCY_KEY_HEADER};
use crate::error::PlatformResult;
use crate::metrics::record_replayed_deduction;

/// Per-user credit balances.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Current balance. Read-only.
    async fn balance(&self, user_id: &str) -> PlatformResult<CreditBalance>;

    /// Atomically deduct credits.
    async fn deduct(&self, request: &DeductionRequest) -> PlatformResult<DeductionReceipt>;
}

/// REST-backed credit ledger.
#[derive(Clone)]
pub struct CreditLedgerRepository {
    client: PlatformClient,
}

impl CreditLedgerRepository {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }

    fn credits_path(user_id: &str) -> String {
        format!("/users/{}/credits", urlencoding::encode(user_id))
    }
}

#[async_trait]
impl CreditLedger for CreditLedgerRepository {
    async fn balance(&self, user_id: &str) -> PlatformResult<CreditBalance> {
        self.client
            .get_json("get_credit_balance", &Self::credits_path(user_id), &[])
            .await
    }

    async fn deduct(&self, request: &DeductionRequest) -> PlatformResult<DeductionReceipt> {
        let path = format!("{}/deductions", Self::credits_path(&request.user_id));

        let receipt: DeductionReceipt = self
            .client
            .post_json(
                "deduct_credits",
                &path,
                request,
                &[(IDEMPOTENCY_KEY_HEADER, request.idempotency_key.as_str())],
            )
            .await?;

        if receipt.replayed {
            record_replayed_deduction();
            warn!(
                user_id = %request.user_id,
                job_id = %request.job_id,
                idempotency_key = %request.idempotency_key,
                "Ledger recognised a replayed deduction"
            );
        } else {
            info!(
                user_id = %request.user_id,
                job_id = %request.job_id,
                units = request.units,
                new_balance = receipt.new_balance,
                "Deducted credits"
            );
        }

        Ok(receipt)
    }
}
