//! Job submission and poll orchestration.
//!
//! A job is submitted once the asset has a resolvable source and the
//! estimated cost is covered. It is then polled on a fixed interval up to
//! a bounded number of attempts. The first terminal observation wins;
//! anything observed afterwards is discarded.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use clipflow_analysis_client::{AnalysisRequest, AnalysisService};
use clipflow_models::{
    AnalysisCostEstimator, AnalysisJob, Clip, CostEstimate, CreditReason, JobId, JobStatus,
    MediaAsset, MediaAssetId, WorkflowEvent,
};
use clipflow_platform::ClipStore;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, GENERIC_FAILURE_MESSAGE};
use crate::ledger::{CreditLedgerAdapter, DeductionOutcome};
use crate::metrics::{record_job, record_poll_attempt, record_poll_miss};
use crate::progress::StageEstimator;
use crate::retry::{sleep_or_cancel, FailureTracker};

/// Consecutive status errors logged before further ones are suppressed.
const MAX_LOGGED_POLL_MISSES: u32 = 3;

/// What a status observation meant for the tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Non-terminal status, possibly unchanged.
    Progress(JobStatus),
    /// First terminal status.
    Terminal(JobStatus),
    /// Arrived after a terminal observation, or moved backward.
    Stale,
}

/// Monotonic view of one remote job.
#[derive(Debug, Clone)]
pub struct JobTracker {
    job: AnalysisJob,
}

impl JobTracker {
    pub fn new(job_id: JobId, media_asset_id: MediaAssetId) -> Self {
        Self {
            job: AnalysisJob::new(job_id, media_asset_id),
        }
    }

    pub fn job(&self) -> &AnalysisJob {
        &self.job
    }

    pub fn into_job(self) -> AnalysisJob {
        self.job
    }

    /// Apply a reported status.
    pub fn observe(&mut self, status: JobStatus, error_message: Option<String>) -> Observation {
        if self.job.is_terminal() {
            return Observation::Stale;
        }
        match self.job.observe(status, error_message) {
            Ok(_) if status.is_terminal() => Observation::Terminal(status),
            Ok(_) => Observation::Progress(status),
            Err(_) => Observation::Stale,
        }
    }

    /// Failure text shown to the user.
    fn failure_message(&self) -> String {
        self.job
            .error_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(GENERIC_FAILURE_MESSAGE)
            .to_string()
    }
}

/// A job accepted by the analysis service.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    pub job_id: JobId,
    pub media_asset_id: MediaAssetId,
    /// Pre-flight estimate the submission was checked against
    pub estimate: CostEstimate,
    /// Terminal status returned directly by the submit call
    pub immediate: Option<(JobStatus, Option<String>)>,
}

/// Result of a completed job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: AnalysisJob,
    pub clips: Vec<Clip>,
    /// `None` when the deduction call failed; the clips are still returned.
    pub deduction: Option<DeductionOutcome>,
}

/// Submits analysis jobs and polls them to a terminal status.
pub struct JobOrchestrator {
    analysis: Arc<dyn AnalysisService>,
    clips: Arc<dyn ClipStore>,
    ledger: Arc<CreditLedgerAdapter>,
    config: PipelineConfig,
}

impl JobOrchestrator {
    pub fn new(
        analysis: Arc<dyn AnalysisService>,
        clips: Arc<dyn ClipStore>,
        ledger: Arc<CreditLedgerAdapter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            analysis,
            clips,
            ledger,
            config,
        }
    }

    /// Estimated credit cost of analysing `asset`.
    pub fn estimate(&self, asset: &MediaAsset) -> CostEstimate {
        AnalysisCostEstimator::new(asset.duration_secs)
            .with_credits_per_minute(self.config.credits_per_minute)
            .with_min_credits(self.config.min_job_credits)
            .calculate()
    }

    /// Submit `asset` for analysis on behalf of `user_id`.
    ///
    /// Fails with `Validation` or `InsufficientCredits` before the analysis
    /// service is contacted.
    pub async fn submit(&self, user_id: &str, asset: &MediaAsset) -> PipelineResult<SubmittedJob> {
        let source_url = asset.resolvable_source().ok_or_else(|| {
            PipelineError::validation(format!(
                "Media asset {} has no playable source URL",
                asset.id
            ))
        })?;

        let estimate = self.estimate(asset);
        let balance = self.ledger.balance(user_id).await?;
        if !balance.covers(estimate.units) {
            info!(
                user_id = %user_id,
                asset_id = %asset.id,
                required = estimate.units,
                balance = balance.balance,
                "Submission blocked by credit balance"
            );
            return Err(PipelineError::InsufficientCredits {
                required: estimate.units,
                balance: balance.balance,
            });
        }

        let request = AnalysisRequest {
            media_asset_id: asset.id.clone(),
            source_url: source_url.to_string(),
            duration_secs: asset.duration_secs,
            max_clips: self.config.max_clips_per_job,
        };
        let response = self.analysis.submit(&request).await?;

        info!(
            user_id = %user_id,
            asset_id = %asset.id,
            job_id = %response.job_id,
            status = %response.status,
            estimated_credits = estimate.units,
            "Analysis job submitted"
        );

        let immediate = response
            .is_synchronous()
            .then(|| (response.status, response.error_message.clone()));

        Ok(SubmittedJob {
            job_id: response.job_id,
            media_asset_id: asset.id.clone(),
            estimate,
            immediate,
        })
    }

    /// Drive a submitted job to its terminal status.
    ///
    /// Emits processing events as attempts elapse. On `completed` the job's
    /// clips are fetched and one deduction sized by the clip count is made.
    pub async fn run_to_terminal(
        &self,
        user_id: &str,
        asset: &MediaAsset,
        submitted: SubmittedJob,
        cancel: &CancellationToken,
        mut on_event: impl FnMut(WorkflowEvent) + Send,
    ) -> PipelineResult<JobOutcome> {
        let span = info_span!("analysis_job", job_id = %submitted.job_id, asset_id = %asset.id);
        let result = self
            .drive(user_id, submitted, cancel, &mut on_event)
            .instrument(span)
            .await;

        record_job(match &result {
            Ok(_) => "completed",
            Err(PipelineError::RemoteJobFailure(_)) => "failed",
            Err(PipelineError::Timeout { .. }) => "timeout",
            Err(PipelineError::Cancelled) => "cancelled",
            Err(_) => "error",
        });
        result
    }

    async fn drive(
        &self,
        user_id: &str,
        submitted: SubmittedJob,
        cancel: &CancellationToken,
        on_event: &mut (impl FnMut(WorkflowEvent) + Send),
    ) -> PipelineResult<JobOutcome> {
        let mut tracker =
            JobTracker::new(submitted.job_id.clone(), submitted.media_asset_id.clone());
        let mut estimator = StageEstimator::new(self.config.poll_max_attempts);
        on_event(estimator.initial_event());

        let terminal = match submitted.immediate.clone() {
            Some((status, message)) => match tracker.observe(status, message) {
                Observation::Terminal(status) => {
                    debug!(status = %status, "Job finished synchronously");
                    status
                }
                _ => self.poll(&mut tracker, &mut estimator, cancel, on_event).await?,
            },
            None => self.poll(&mut tracker, &mut estimator, cancel, on_event).await?,
        };

        match terminal {
            JobStatus::Completed => self.complete(user_id, tracker, &submitted.estimate).await,
            _ => {
                let message = tracker.failure_message();
                warn!(job_id = %submitted.job_id, error = %message, "Analysis job failed");
                Err(PipelineError::RemoteJobFailure(message))
            }
        }
    }

    /// Poll until the first terminal observation or the attempt bound.
    async fn poll(
        &self,
        tracker: &mut JobTracker,
        estimator: &mut StageEstimator,
        cancel: &CancellationToken,
        on_event: &mut (impl FnMut(WorkflowEvent) + Send),
    ) -> PipelineResult<JobStatus> {
        let job_id = tracker.job().id.clone();
        let max_attempts = self.config.poll_max_attempts;
        let mut misses = FailureTracker::new(MAX_LOGGED_POLL_MISSES);

        for attempt in 1..=max_attempts {
            sleep_or_cancel(self.config.poll_interval, cancel).await?;
            record_poll_attempt();

            let report = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                r = self.analysis.status(&job_id) => r,
            };

            match report {
                Ok(report) => {
                    misses.record_success();
                    match tracker.observe(report.status, report.error_message) {
                        Observation::Terminal(status) => {
                            info!(
                                job_id = %job_id,
                                status = %status,
                                attempt,
                                "Job reached terminal status"
                            );
                            return Ok(status);
                        }
                        Observation::Progress(status) => {
                            debug!(
                                job_id = %job_id,
                                status = %status,
                                attempt,
                                "Job still running"
                            );
                        }
                        Observation::Stale => {
                            debug!(
                                job_id = %job_id,
                                reported = %report.status,
                                attempt,
                                "Discarding stale status"
                            );
                        }
                    }
                }
                Err(e) => {
                    record_poll_miss();
                    if misses.record_failure() {
                        warn!(
                            job_id = %job_id,
                            attempt,
                            error = %e,
                            "Status check failed, will retry"
                        );
                    }
                }
            }

            on_event(estimator.advance(attempt));
        }

        warn!(
            job_id = %job_id,
            attempts = max_attempts,
            misses = misses.total_failures(),
            "Job polling timed out"
        );
        Err(PipelineError::Timeout {
            attempts: max_attempts,
        })
    }

    async fn complete(
        &self,
        user_id: &str,
        tracker: JobTracker,
        estimate: &CostEstimate,
    ) -> PipelineResult<JobOutcome> {
        let job = tracker.into_job();
        let clips = self.clips.list_for_job(&job.id).await?;

        let mut metadata = estimate.to_metadata();
        metadata.insert("media_asset_id".to_string(), job.media_asset_id.to_string());
        metadata.insert("clip_count".to_string(), clips.len().to_string());

        let units = u32::try_from(clips.len()).unwrap_or(u32::MAX);
        let deduction = match self
            .ledger
            .deduct(user_id, &job.id, units, CreditReason::ClipGeneration, metadata)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                // Clips stay visible even if metering failed.
                warn!(job_id = %job.id, error = %e, "Deduction failed after job completion");
                None
            }
        };

        info!(job_id = %job.id, clip_count = clips.len(), "Analysis job completed");
        Ok(JobOutcome {
            job,
            clips,
            deduction,
        })
    }
}
