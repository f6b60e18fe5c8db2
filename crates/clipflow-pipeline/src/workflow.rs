//! Workflow entry point.
//!
//! A [`Workflow`] belongs to one user and runs at most one upload-and-analyze
//! pass at a time. Each pass runs as a spawned task and reports progress
//! through its [`WorkflowHandle`]; the event stream ends after the terminal
//! event (Gallery, or back to Intake with an error).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use clipflow_analysis_client::AnalysisService;
use clipflow_models::{
    ClipView, JobId, MediaAsset, MediaAssetId, MediaFilter, WorkflowEvent, WorkflowId,
    WorkflowPhase,
};
use clipflow_platform::{sort_clips_by_start, ClipStore, MediaRegistry};
use clipflow_storage::{DeliveryConfig, UploadTransport};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ledger::{CreditLedgerAdapter, DeductionOutcome};
use crate::logging::WorkflowLogger;
use crate::orchestrator::JobOrchestrator;
use crate::resolver::resolve_views;
use crate::state_machine::{PhaseEvent, ProcessingStateMachine};
use crate::upload::{MediaFile, UploadCoordinator};

/// What a workflow pass starts from.
#[derive(Debug, Clone)]
pub enum WorkflowInput {
    /// Upload a local file, then analyze it.
    File(MediaFile),
    /// Reuse a registered asset; no upload.
    ExistingAsset(MediaAssetId),
}

/// Collaborators a workflow talks to.
#[derive(Clone)]
pub struct WorkflowServices {
    pub transport: Arc<dyn UploadTransport>,
    pub delivery: DeliveryConfig,
    pub registry: Arc<dyn MediaRegistry>,
    pub clip_store: Arc<dyn ClipStore>,
    pub analysis: Arc<dyn AnalysisService>,
    pub ledger: Arc<CreditLedgerAdapter>,
}

/// How a pass ended.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    Gallery {
        asset: MediaAsset,
        /// Job that produced the clips; `None` when showing earlier results
        job_id: Option<JobId>,
        clips: Vec<ClipView>,
        deduction: Option<DeductionOutcome>,
    },
    Intake {
        /// Asset retained for resubmission
        asset: Option<MediaAsset>,
        error: String,
    },
}

impl WorkflowOutcome {
    pub fn phase(&self) -> WorkflowPhase {
        match self {
            WorkflowOutcome::Gallery { .. } => WorkflowPhase::Gallery,
            WorkflowOutcome::Intake { .. } => WorkflowPhase::Intake,
        }
    }
}

/// Subscription to one workflow pass.
pub struct WorkflowHandle {
    id: WorkflowId,
    events: mpsc::UnboundedReceiver<WorkflowEvent>,
    cancel: CancellationToken,
    task: JoinHandle<WorkflowOutcome>,
}

impl WorkflowHandle {
    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    /// Abandon the pass. Remote work already started keeps running.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next progress event; `None` once the pass has ended.
    pub async fn next_event(&mut self) -> Option<WorkflowEvent> {
        self.events.recv().await
    }

    /// Progress events as a finite stream.
    pub fn events(&mut self) -> impl Stream<Item = WorkflowEvent> + '_ {
        futures::stream::poll_fn(move |cx| self.events.poll_recv(cx))
    }

    /// Wait for the pass to finish.
    pub async fn outcome(self) -> PipelineResult<WorkflowOutcome> {
        self.task
            .await
            .map_err(|e| PipelineError::TaskFailed(e.to_string()))
    }
}

enum RunInput {
    File(MediaFile),
    Existing(MediaAssetId),
    Retained(MediaAsset),
}

impl RunInput {
    fn describe(&self) -> String {
        match self {
            RunInput::File(file) => format!("upload {}", file.path.display()),
            RunInput::Existing(id) => format!("existing asset {}", id),
            RunInput::Retained(asset) => format!("resubmit asset {}", asset.id),
        }
    }
}

/// Upload-and-analyze workflow for one user.
#[derive(Clone)]
pub struct Workflow {
    inner: Arc<WorkflowInner>,
}

struct WorkflowInner {
    user_id: String,
    registry: Arc<dyn MediaRegistry>,
    clip_store: Arc<dyn ClipStore>,
    ledger: Arc<CreditLedgerAdapter>,
    uploader: UploadCoordinator,
    orchestrator: JobOrchestrator,
    state: Mutex<ProcessingStateMachine>,
    busy: AtomicBool,
}

/// Clears the busy flag when a pass ends.
struct BusyGuard(Arc<WorkflowInner>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::SeqCst);
    }
}

impl Workflow {
    pub fn new(
        user_id: impl Into<String>,
        services: WorkflowServices,
        config: PipelineConfig,
    ) -> Self {
        let uploader =
            UploadCoordinator::new(services.transport, services.delivery, config.clone());
        let orchestrator = JobOrchestrator::new(
            services.analysis,
            services.clip_store.clone(),
            services.ledger.clone(),
            config,
        );

        Self {
            inner: Arc::new(WorkflowInner {
                user_id: user_id.into(),
                registry: services.registry,
                clip_store: services.clip_store,
                ledger: services.ledger,
                uploader,
                orchestrator,
                state: Mutex::new(ProcessingStateMachine::new()),
                busy: AtomicBool::new(false),
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.inner.lock_state().phase()
    }

    /// Asset currently selected; kept across failures.
    pub fn selected_asset(&self) -> Option<MediaAsset> {
        self.inner.lock_state().asset().cloned()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock_state().last_error().map(str::to_string)
    }

    /// Whether a pass is running.
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    /// Start a pass from a file or an existing asset.
    pub fn submit(&self, input: WorkflowInput) -> PipelineResult<WorkflowHandle> {
        let input = match input {
            WorkflowInput::File(file) => RunInput::File(file),
            WorkflowInput::ExistingAsset(id) => RunInput::Existing(id),
        };
        self.start(input)
    }

    /// Submit a new job for the retained asset without uploading again.
    pub fn resubmit(&self) -> PipelineResult<WorkflowHandle> {
        let asset = self
            .selected_asset()
            .ok_or_else(|| PipelineError::validation("No media asset selected"))?;
        self.start(RunInput::Retained(asset))
    }

    /// Leave the gallery, keeping the asset, so another job can be submitted.
    pub fn generate_more(&self) -> PipelineResult<WorkflowPhase> {
        if self.is_busy() {
            return Err(PipelineError::WorkflowBusy("a pass is still running".to_string()));
        }
        self.inner.transition(PhaseEvent::GenerateMore)
    }

    /// The user's assets, most recent first.
    pub async fn list_media(&self, filter: MediaFilter) -> PipelineResult<Vec<MediaAsset>> {
        Ok(self.inner.registry.list(&self.inner.user_id, filter).await?)
    }

    /// The user's current credit balance.
    pub async fn balance(&self) -> PipelineResult<i64> {
        Ok(self.inner.ledger.balance(&self.inner.user_id).await?.balance)
    }

    fn start(&self, input: RunInput) -> PipelineResult<WorkflowHandle> {
        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::WorkflowBusy("a pass is already running".to_string()));
        }
        let busy = BusyGuard(self.inner.clone());

        let phase = self.phase();
        if phase != WorkflowPhase::Intake {
            return Err(PipelineError::invalid_transition(phase, "submit"));
        }

        let id = WorkflowId::new();
        let logger = WorkflowLogger::new(&id, &self.inner.user_id, "upload_and_analyze");
        let span = logger.create_span();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let inner = self.inner.clone();
        let token = cancel.clone();
        let task = tokio::spawn(
            async move {
                let _busy = busy;
                inner.run(input, tx, token, logger).await
            }
            .instrument(span),
        );

        Ok(WorkflowHandle {
            id,
            events: rx,
            cancel,
            task,
        })
    }
}

type EventSender = mpsc::UnboundedSender<WorkflowEvent>;

impl WorkflowInner {
    fn lock_state(&self) -> MutexGuard<'_, ProcessingStateMachine> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn transition(&self, event: PhaseEvent) -> PipelineResult<WorkflowPhase> {
        self.lock_state().apply(event)
    }

    async fn run(
        &self,
        input: RunInput,
        events: EventSender,
        cancel: CancellationToken,
        logger: WorkflowLogger,
    ) -> WorkflowOutcome {
        logger.log_start(&input.describe());

        match self.execute(input, &events, &cancel, &logger).await {
            Ok(outcome) => {
                if let WorkflowOutcome::Gallery { clips, .. } = &outcome {
                    logger.log_completion(&format!("{} clips ready", clips.len()));
                    let _ = events.send(WorkflowEvent::gallery(clips.len()));
                }
                outcome
            }
            Err(e) => {
                let message = e.user_message();
                let phase = self.lock_state().phase();
                if let Err(te) = self.transition(failure_event(phase, &e, message.clone())) {
                    logger.log_warning(&te.to_string());
                }
                logger.log_error(&e.to_string());
                let _ = events.send(WorkflowEvent::failed(message.clone()));

                WorkflowOutcome::Intake {
                    asset: self.lock_state().asset().cloned(),
                    error: message,
                }
            }
        }
    }

    async fn execute(
        &self,
        input: RunInput,
        events: &EventSender,
        cancel: &CancellationToken,
        logger: &WorkflowLogger,
    ) -> PipelineResult<WorkflowOutcome> {
        let asset = match input {
            RunInput::File(file) => self.upload(&file, events, cancel, logger).await?,
            RunInput::Existing(id) => {
                let asset = self.registry.get(&id).await?;
                let mut existing = self.clip_store.list_for_asset(&asset.id).await?;
                let phase = self.transition(PhaseEvent::SelectExisting {
                    asset: asset.clone(),
                    has_clips: !existing.is_empty(),
                })?;

                if phase == WorkflowPhase::Gallery {
                    logger.log_progress("showing existing clips");
                    sort_clips_by_start(&mut existing);
                    return Ok(WorkflowOutcome::Gallery {
                        clips: resolve_views(&existing, &asset),
                        asset,
                        job_id: None,
                        deduction: None,
                    });
                }
                asset
            }
            RunInput::Retained(asset) => asset,
        };

        self.analyze(asset, events, cancel, logger).await
    }

    async fn upload(
        &self,
        file: &MediaFile,
        events: &EventSender,
        cancel: &CancellationToken,
        logger: &WorkflowLogger,
    ) -> PipelineResult<MediaAsset> {
        self.transition(PhaseEvent::StartUpload)?;

        let result = self
            .uploader
            .begin(file, cancel, |percent| {
                let _ = events.send(WorkflowEvent::uploading(percent));
            })
            .await?;

        let asset = self.registry.create_from_upload(&self.user_id, &result).await?;
        logger.log_progress(&format!("registered asset {}", asset.id));
        self.transition(PhaseEvent::UploadCompleted(asset.clone()))?;
        Ok(asset)
    }

    async fn analyze(
        &self,
        asset: MediaAsset,
        events: &EventSender,
        cancel: &CancellationToken,
        logger: &WorkflowLogger,
    ) -> PipelineResult<WorkflowOutcome> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let submitted = self.orchestrator.submit(&self.user_id, &asset).await?;
        let job_id = submitted.job_id.clone();
        self.transition(PhaseEvent::JobSubmitted(job_id.clone()))?;
        logger.log_progress(&format!("job {} submitted", job_id));

        let outcome = self
            .orchestrator
            .run_to_terminal(&self.user_id, &asset, submitted, cancel, |event| {
                let _ = events.send(event);
            })
            .await?;

        if outcome.deduction.is_none() {
            logger.log_warning(&format!("credits for job {} were not deducted", job_id));
        }
        self.transition(PhaseEvent::JobCompleted(job_id.clone()))?;

        Ok(WorkflowOutcome::Gallery {
            clips: resolve_views(&outcome.clips, &asset),
            asset,
            job_id: Some(job_id),
            deduction: outcome.deduction,
        })
    }
}

/// State machine event for a failed pass in `phase`.
fn failure_event(phase: WorkflowPhase, error: &PipelineError, message: String) -> PhaseEvent {
    match (phase, error) {
        (WorkflowPhase::Uploading | WorkflowPhase::Processing, PipelineError::Cancelled) => {
            PhaseEvent::Cancelled
        }
        (WorkflowPhase::Processing, PipelineError::Timeout { .. }) => {
            PhaseEvent::JobTimedOut(message)
        }
        (WorkflowPhase::Processing, _) => PhaseEvent::JobFailed(message),
        (WorkflowPhase::Uploading, _) => PhaseEvent::UploadFailed(message),
        _ => PhaseEvent::SubmissionRejected(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_event_mapping() {
        let timeout = PipelineError::Timeout { attempts: 60 };
        assert!(matches!(
            failure_event(WorkflowPhase::Processing, &timeout, "t".into()),
            PhaseEvent::JobTimedOut(_)
        ));
        assert!(matches!(
            failure_event(WorkflowPhase::Uploading, &PipelineError::Cancelled, "c".into()),
            PhaseEvent::Cancelled
        ));
        assert!(matches!(
            failure_event(WorkflowPhase::Uploading, &PipelineError::upload_failed("x"), "x".into()),
            PhaseEvent::UploadFailed(_)
        ));
        assert!(matches!(
            failure_event(
                WorkflowPhase::Intake,
                &PipelineError::InsufficientCredits { required: 2, balance: 1 },
                "x".into()
            ),
            PhaseEvent::SubmissionRejected(_)
        ));
    }
}
