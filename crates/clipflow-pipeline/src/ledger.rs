//! Credit ledger adapter.
//!
//! Performs at most one metered deduction per completed job:
//! - an "already processed" marker keyed by job ID, shared by every
//!   workflow that uses the same adapter
//! - an idempotency key (`job:{id}`) on the request, so the ledger service
//!   itself recognises replays from other processes
//! - a per-user async lock, so deductions for one user never overlap
//!
//! The marker is set when a deduction is attempted, not when it succeeds.
//! A failed deduction is reported but never retried automatically.
//!
//! Markers are kept for the most recent jobs only; older ones fall back on
//! the ledger's idempotency key. A user's lock is dropped once no deduction
//! holds or awaits it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use clipflow_models::{CreditBalance, CreditReason, CreditTransaction, DeductionRequest, JobId};
use clipflow_platform::CreditLedger;

use crate::error::{PipelineError, PipelineResult};
use crate::metrics::record_deduction;

/// Default number of job markers retained.
pub const DEFAULT_PROCESSED_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct Markers {
    jobs: HashSet<JobId>,
    order: VecDeque<JobId>,
}

/// Jobs for which a deduction has been attempted, oldest evicted first.
#[derive(Debug, Clone)]
pub struct ProcessedJobs {
    inner: Arc<Mutex<Markers>>,
    capacity: usize,
}

impl Default for ProcessedJobs {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PROCESSED_CAPACITY)
    }
}

impl ProcessedJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Markers::default())),
            capacity: capacity.max(1),
        }
    }

    fn markers(&self) -> std::sync::MutexGuard<'_, Markers> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Mark a job; returns `false` if it was already marked.
    pub fn mark(&self, job_id: &JobId) -> bool {
        let mut markers = self.markers();
        if !markers.jobs.insert(job_id.clone()) {
            return false;
        }
        markers.order.push_back(job_id.clone());
        while markers.order.len() > self.capacity {
            if let Some(oldest) = markers.order.pop_front() {
                markers.jobs.remove(&oldest);
            }
        }
        true
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.markers().jobs.contains(job_id)
    }

    pub fn len(&self) -> usize {
        self.markers().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a deduction request.
#[derive(Debug, Clone, PartialEq)]
pub enum DeductionOutcome {
    /// Credits were deducted.
    Charged(CreditTransaction),
    /// The ledger recognised the idempotency key; nothing was charged again.
    Replayed { new_balance: i64 },
    /// A deduction was already attempted for this job.
    AlreadyProcessed,
    /// The job produced nothing billable.
    NothingToCharge,
}

impl DeductionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeductionOutcome::Charged(_) => "charged",
            DeductionOutcome::Replayed { .. } => "replayed",
            DeductionOutcome::AlreadyProcessed | DeductionOutcome::NothingToCharge => "skipped",
        }
    }
}

/// Exactly-once deduction front for the credit ledger service.
pub struct CreditLedgerAdapter {
    ledger: Arc<dyn CreditLedger>,
    processed: ProcessedJobs,
    user_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CreditLedgerAdapter {
    pub fn new(ledger: Arc<dyn CreditLedger>) -> Self {
        Self::with_processed(ledger, ProcessedJobs::new())
    }

    /// Share an existing marker set.
    pub fn with_processed(ledger: Arc<dyn CreditLedger>, processed: ProcessedJobs) -> Self {
        Self {
            ledger,
            processed,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn processed(&self) -> &ProcessedJobs {
        &self.processed
    }

    /// Current balance. Read-only and not serialized.
    pub async fn balance(&self, user_id: &str) -> PipelineResult<CreditBalance> {
        Ok(self.ledger.balance(user_id).await?)
    }

    fn locks(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        match self.user_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        self.locks()
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the user's lock entry unless another deduction holds a handle.
    fn release_user_lock(&self, user_id: &str, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.locks();
        // One reference in the map, one here.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(user_id);
        }
    }

    /// Users with a live lock entry.
    pub fn tracked_users(&self) -> usize {
        self.locks().len()
    }

    /// Deduct `units` for a completed job.
    ///
    /// Repeated calls for the same job return `AlreadyProcessed` without
    /// contacting the ledger.
    pub async fn deduct(
        &self,
        user_id: &str,
        job_id: &JobId,
        units: u32,
        reason: CreditReason,
        metadata: HashMap<String, String>,
    ) -> PipelineResult<DeductionOutcome> {
        let lock = self.user_lock(user_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.deduct_locked(user_id, job_id, units, reason, metadata).await
        };
        self.release_user_lock(user_id, lock);
        outcome
    }

    async fn deduct_locked(
        &self,
        user_id: &str,
        job_id: &JobId,
        units: u32,
        reason: CreditReason,
        metadata: HashMap<String, String>,
    ) -> PipelineResult<DeductionOutcome> {
        if !self.processed.mark(job_id) {
            warn!(user_id = %user_id, job_id = %job_id, "Deduction already processed for job");
            record_deduction("skipped");
            return Ok(DeductionOutcome::AlreadyProcessed);
        }

        if units == 0 {
            info!(user_id = %user_id, job_id = %job_id, "Job produced no clips, nothing to charge");
            record_deduction("skipped");
            return Ok(DeductionOutcome::NothingToCharge);
        }

        let mut request = DeductionRequest::for_job(user_id, job_id, units, reason);
        request.metadata.extend(metadata);

        match self.ledger.deduct(&request).await {
            Ok(receipt) if receipt.replayed => {
                record_deduction("replayed");
                Ok(DeductionOutcome::Replayed {
                    new_balance: receipt.new_balance,
                })
            }
            Ok(receipt) => {
                record_deduction("charged");
                info!(
                    user_id = %user_id,
                    job_id = %job_id,
                    units,
                    new_balance = receipt.new_balance,
                    "Charged credits for completed job"
                );
                Ok(DeductionOutcome::Charged(CreditTransaction::from_receipt(&request, &receipt)))
            }
            Err(e) => {
                record_deduction("failed");
                error!(
                    user_id = %user_id,
                    job_id = %job_id,
                    units,
                    error = %e,
                    "Credit deduction failed"
                );
                Err(PipelineError::Ledger(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeLedger;

    #[tokio::test]
    async fn test_deducts_once_per_job() {
        let ledger = Arc::new(FakeLedger::with_balance("user-1", 100));
        let adapter = CreditLedgerAdapter::new(ledger.clone());
        let job = JobId::from("job-1");

        let first = adapter
            .deduct("user-1", &job, 5, CreditReason::ClipGeneration, HashMap::new())
            .await
            .unwrap();
        assert!(matches!(first, DeductionOutcome::Charged(ref tx) if tx.balance_after == 95));

        let second = adapter
            .deduct("user-1", &job, 5, CreditReason::ClipGeneration, HashMap::new())
            .await
            .unwrap();
        assert_eq!(second, DeductionOutcome::AlreadyProcessed);

        assert_eq!(ledger.deduction_count(), 1);
        assert_eq!(ledger.balance_of("user-1"), 95);
    }

    #[tokio::test]
    async fn test_shared_marker_across_adapters() {
        let ledger = Arc::new(FakeLedger::with_balance("user-1", 100));
        let processed = ProcessedJobs::new();
        let a = CreditLedgerAdapter::with_processed(ledger.clone(), processed.clone());
        let b = CreditLedgerAdapter::with_processed(ledger.clone(), processed.clone());
        let job = JobId::from("job-1");

        a.deduct("user-1", &job, 3, CreditReason::ClipGeneration, HashMap::new())
            .await
            .unwrap();
        let outcome = b
            .deduct("user-1", &job, 3, CreditReason::ClipGeneration, HashMap::new())
            .await
            .unwrap();

        assert_eq!(outcome, DeductionOutcome::AlreadyProcessed);
        assert!(processed.contains(&job));
        assert_eq!(ledger.balance_of("user-1"), 97);
    }

    #[tokio::test]
    async fn test_zero_units_skips_ledger() {
        let ledger = Arc::new(FakeLedger::with_balance("user-1", 10));
        let adapter = CreditLedgerAdapter::new(ledger.clone());

        let outcome = adapter
            .deduct(
                "user-1",
                &JobId::from("job-1"),
                0,
                CreditReason::ClipGeneration,
                HashMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, DeductionOutcome::NothingToCharge);
        assert_eq!(ledger.deduction_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_not_retried() {
        let ledger = Arc::new(FakeLedger::with_balance("user-1", 10));
        ledger.fail_deductions(true);
        let adapter = CreditLedgerAdapter::new(ledger.clone());
        let job = JobId::from("job-1");

        let err = adapter
            .deduct("user-1", &job, 2, CreditReason::ClipGeneration, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Ledger(_)));

        ledger.fail_deductions(false);
        let outcome = adapter
            .deduct("user-1", &job, 2, CreditReason::ClipGeneration, HashMap::new())
            .await
            .unwrap();
        assert_eq!(outcome, DeductionOutcome::AlreadyProcessed);
        assert_eq!(ledger.balance_of("user-1"), 10);
    }

    #[tokio::test]
    async fn test_replayed_receipt() {
        let ledger = Arc::new(FakeLedger::with_balance("user-1", 10));
        let job = JobId::from("job-1");
        ledger.preload_idempotency_key(&DeductionRequest::idempotency_key_for(&job));
        let adapter = CreditLedgerAdapter::new(ledger.clone());

        let outcome = adapter
            .deduct("user-1", &job, 2, CreditReason::ClipGeneration, HashMap::new())
            .await
            .unwrap();
        assert_eq!(outcome, DeductionOutcome::Replayed { new_balance: 10 });
    }

    #[tokio::test]
    async fn test_concurrent_deductions_for_one_user() {
        let ledger = Arc::new(FakeLedger::with_balance("user-1", 100));
        let adapter = Arc::new(CreditLedgerAdapter::new(ledger.clone()));

        let mut handles = Vec::new();
        for i in 0..10 {
            let adapter = adapter.clone();
            handles.push(tokio::spawn(async move {
                // Two observations per job.
                let job = JobId::from_string(format!("job-{}", i % 5));
                adapter
                    .deduct("user-1", &job, 1, CreditReason::ClipGeneration, HashMap::new())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.deduction_count(), 5);
        assert_eq!(ledger.balance_of("user-1"), 95);
        assert_eq!(ledger.max_concurrent_deductions(), 1);
        assert_eq!(adapter.tracked_users(), 0);
    }

    #[tokio::test]
    async fn test_user_lock_released_after_deduction() {
        let ledger = Arc::new(FakeLedger::with_balance("user-1", 10));
        ledger.fail_deductions(true);
        let adapter = CreditLedgerAdapter::new(ledger.clone());

        let reason = CreditReason::ClipGeneration;
        let _ = adapter
            .deduct("user-1", &JobId::from("job-1"), 1, reason, HashMap::new())
            .await;
        assert_eq!(adapter.tracked_users(), 0);

        ledger.fail_deductions(false);
        adapter
            .deduct("user-1", &JobId::from("job-2"), 1, reason, HashMap::new())
            .await
            .unwrap();
        assert_eq!(adapter.tracked_users(), 0);
    }

    #[test]
    fn test_processed_markers_are_bounded() {
        let processed = ProcessedJobs::with_capacity(2);
        assert!(processed.mark(&JobId::from("job-1")));
        assert!(processed.mark(&JobId::from("job-2")));
        assert!(!processed.mark(&JobId::from("job-2")));
        assert!(processed.mark(&JobId::from("job-3")));

        assert_eq!(processed.len(), 2);
        assert!(!processed.contains(&JobId::from("job-1")));
        assert!(processed.contains(&JobId::from("job-3")));
    }
}
