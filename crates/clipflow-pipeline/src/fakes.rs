//! In-memory fakes of the service traits for orchestrator and workflow tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use clipflow_analysis_client::{
    AnalysisError, AnalysisRequest, AnalysisResult, AnalysisService, JobStatusReport,
    SubmitResponse,
};
use clipflow_models::{
    Clip, CreditBalance, DeductionReceipt, DeductionRequest, JobId, JobStatus, MediaAsset,
    MediaAssetId, MediaFilter, UploadResult,
};
use clipflow_platform::{
    sort_most_recent_first, ClipStore, CreditLedger, MediaRegistry, PlatformError, PlatformResult,
};
use clipflow_storage::{
    ChunkAck, ChunkRange, RemoteSession, StorageError, StorageResult, StoredObject, UploadTarget,
    UploadTransport,
};

// ============================================================================
// Upload transport
// ============================================================================

#[derive(Default)]
struct TransportState {
    stored: Vec<u8>,
    total: u64,
    fail_chunks: HashMap<u32, u32>,
    reject_chunk: Option<u32>,
    rate_limited_chunks: HashMap<u32, u64>,
    chunk_offsets: Vec<u64>,
    sessions: u32,
    committed_queries: u32,
}

/// Stores chunks in memory; chunks must arrive at the committed offset.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<TransportState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the chunk with `index` transiently `times` times.
    pub fn fail_chunk(self, index: u32, times: u32) -> Self {
        self.state.lock().unwrap().fail_chunks.insert(index, times);
        self
    }

    /// Answer the chunk with `index` once with a 429 asking to wait `secs`.
    pub fn rate_limit_chunk(self, index: u32, secs: u64) -> Self {
        self.state.lock().unwrap().rate_limited_chunks.insert(index, secs);
        self
    }

    /// Reject the chunk with `index` permanently.
    pub fn reject_chunk(self, index: u32) -> Self {
        self.state.lock().unwrap().reject_chunk = Some(index);
        self
    }

    /// Offsets of every chunk attempt, in order.
    pub fn chunk_offsets(&self) -> Vec<u64> {
        self.state.lock().unwrap().chunk_offsets.clone()
    }

    pub fn stored_bytes(&self) -> Vec<u8> {
        self.state.lock().unwrap().stored.clone()
    }

    pub fn sessions_created(&self) -> u32 {
        self.state.lock().unwrap().sessions
    }

    pub fn committed_queries(&self) -> u32 {
        self.state.lock().unwrap().committed_queries
    }
}

#[async_trait]
impl UploadTransport for FakeTransport {
    async fn create_session(&self, target: &UploadTarget) -> StorageResult<RemoteSession> {
        let mut state = self.state.lock().unwrap();
        state.sessions += 1;
        state.stored.clear();
        state.total = target.total_bytes;
        let id = format!("upload-{}", state.sessions);
        Ok(RemoteSession::new(id.clone(), format!("mem://{}", id), target.total_bytes))
    }

    async fn upload_chunk(
        &self,
        _session: &mut RemoteSession,
        range: ChunkRange,
        data: Vec<u8>,
    ) -> StorageResult<ChunkAck> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.chunk_offsets.push(range.offset);

        if state.reject_chunk == Some(range.index) {
            return Err(StorageError::Rejected(400, "chunk rejected".to_string()));
        }
        if let Some(secs) = state.rate_limited_chunks.remove(&range.index) {
            let retry_after = secs.to_string();
            return Err(StorageError::from_http_reply(429, Some(&retry_after), ""));
        }
        if let Some(remaining) = state.fail_chunks.get_mut(&range.index) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::chunk_failed(range.offset, "connection reset"));
            }
        }
        if range.offset != state.stored.len() as u64 {
            return Err(StorageError::protocol_violation(format!(
                "expected offset {}, got {}",
                state.stored.len(),
                range.offset
            )));
        }

        state.stored.extend_from_slice(&data);
        Ok(ChunkAck {
            committed_offset: state.stored.len() as u64,
        })
    }

    async fn committed_offset(&self, _session: &mut RemoteSession) -> StorageResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.committed_queries += 1;
        Ok(state.stored.len() as u64)
    }

    async fn finish(&self, session: &RemoteSession) -> StorageResult<StoredObject> {
        let state = self.state.lock().unwrap();
        if state.stored.len() as u64 != state.total {
            return Err(StorageError::protocol_violation("object incomplete"));
        }
        Ok(StoredObject {
            external_id: format!("ext-{}", session.upload_id),
        })
    }
}

// ============================================================================
// Media registry and clip store
// ============================================================================

#[derive(Default)]
pub struct FakeRegistry {
    assets: Mutex<Vec<MediaAsset>>,
    creates: AtomicU32,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(self, asset: MediaAsset) -> Self {
        self.assets.lock().unwrap().push(asset);
        self
    }

    pub fn create_count(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaRegistry for FakeRegistry {
    async fn create_from_upload(
        &self,
        user_id: &str,
        result: &UploadResult,
    ) -> PlatformResult<MediaAsset> {
        let asset = MediaAsset::from_upload(user_id, result)?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.assets.lock().unwrap().push(asset.clone());
        Ok(asset)
    }

    async fn list(&self, user_id: &str, filter: MediaFilter) -> PlatformResult<Vec<MediaAsset>> {
        let mut assets: Vec<MediaAsset> = self
            .assets
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.user_id == user_id && filter.matches(a.kind))
            .cloned()
            .collect();
        sort_most_recent_first(&mut assets);
        Ok(assets)
    }

    async fn get(&self, id: &MediaAssetId) -> PlatformResult<MediaAsset> {
        self.assets
            .lock()
            .unwrap()
            .iter()
            .find(|a| &a.id == id)
            .cloned()
            .ok_or_else(|| PlatformError::not_found(format!("media asset {}", id)))
    }
}

#[derive(Default)]
pub struct FakeClipStore {
    clips: Mutex<Vec<Clip>>,
    fail_job_listing: Mutex<bool>,
    job_listings: AtomicU32,
}

impl FakeClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_clips(&self, clips: impl IntoIterator<Item = Clip>) {
        self.clips.lock().unwrap().extend(clips);
    }

    pub fn fail_job_listing(&self, fail: bool) {
        *self.fail_job_listing.lock().unwrap() = fail;
    }

    pub fn job_listing_count(&self) -> u32 {
        self.job_listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClipStore for FakeClipStore {
    async fn list_for_job(&self, job_id: &JobId) -> PlatformResult<Vec<Clip>> {
        self.job_listings.fetch_add(1, Ordering::SeqCst);
        if *self.fail_job_listing.lock().unwrap() {
            return Err(PlatformError::ServerError(500, "clip listing unavailable".to_string()));
        }
        Ok(self
            .clips
            .lock()
            .unwrap()
            .iter()
            .filter(|c| &c.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn list_for_asset(&self, asset_id: &MediaAssetId) -> PlatformResult<Vec<Clip>> {
        Ok(self
            .clips
            .lock()
            .unwrap()
            .iter()
            .filter(|c| &c.media_asset_id == asset_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Credit ledger
// ============================================================================

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, i64>,
    seen_keys: HashSet<String>,
    charged: Vec<DeductionRequest>,
    fail: bool,
}

/// Ledger with idempotency-key replay detection and overlap tracking.
#[derive(Default)]
pub struct FakeLedger {
    state: Mutex<LedgerState>,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl FakeLedger {
    pub fn with_balance(user_id: &str, balance: i64) -> Self {
        let ledger = Self::default();
        ledger
            .state
            .lock()
            .unwrap()
            .balances
            .insert(user_id.to_string(), balance);
        ledger
    }

    /// Deductions that actually charged.
    pub fn deduction_count(&self) -> usize {
        self.state.lock().unwrap().charged.len()
    }

    pub fn charged(&self) -> Vec<DeductionRequest> {
        self.state.lock().unwrap().charged.clone()
    }

    pub fn balance_of(&self, user_id: &str) -> i64 {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(user_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_deductions(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }

    /// Pretend another process already charged under `key`.
    pub fn preload_idempotency_key(&self, key: &str) {
        self.state.lock().unwrap().seen_keys.insert(key.to_string());
    }

    pub fn max_concurrent_deductions(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn apply(&self, request: &DeductionRequest) -> PlatformResult<DeductionReceipt> {
        let mut state = self.state.lock().unwrap();
        if state.fail {
            return Err(PlatformError::ServerError(503, "ledger unavailable".to_string()));
        }

        let balance = state.balances.get(&request.user_id).copied().unwrap_or(0);
        if state.seen_keys.contains(&request.idempotency_key) {
            return Ok(DeductionReceipt {
                transaction_id: format!("tx-{}", request.idempotency_key),
                new_balance: balance,
                replayed: true,
            });
        }

        let new_balance = balance - i64::from(request.units);
        state.balances.insert(request.user_id.clone(), new_balance);
        state.seen_keys.insert(request.idempotency_key.clone());
        state.charged.push(request.clone());
        Ok(DeductionReceipt {
            transaction_id: format!("tx-{}", state.charged.len()),
            new_balance,
            replayed: false,
        })
    }
}

#[async_trait]
impl CreditLedger for FakeLedger {
    async fn balance(&self, user_id: &str) -> PlatformResult<CreditBalance> {
        Ok(CreditBalance::new(self.balance_of(user_id)))
    }

    async fn deduct(&self, request: &DeductionRequest) -> PlatformResult<DeductionReceipt> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Give overlapping callers a chance to interleave.
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        let result = self.apply(request);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ============================================================================
// Analysis service
// ============================================================================

#[derive(Debug, Clone)]
enum Scripted {
    Status(JobStatus, Option<String>),
    Unavailable,
}

#[derive(Default)]
struct AnalysisState {
    script: VecDeque<Scripted>,
    requests: Vec<AnalysisRequest>,
    status_calls: u32,
    synchronous: Option<(JobStatus, Option<String>)>,
    reject: bool,
}

/// Scripted analysis service. Job IDs are `job-1`, `job-2`, ... in
/// submission order; once the script runs out every job reports `running`.
#[derive(Default)]
pub struct FakeAnalysis {
    state: Mutex<AnalysisState>,
}

impl FakeAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `n` `running` reports.
    pub fn running_for(&self, n: u32) {
        for _ in 0..n {
            self.push(Scripted::Status(JobStatus::Running, None));
        }
    }

    pub fn then_completed(&self) {
        self.push(Scripted::Status(JobStatus::Completed, None));
    }

    pub fn then_failed(&self, message: Option<&str>) {
        self.push(Scripted::Status(JobStatus::Failed, message.map(str::to_string)));
    }

    pub fn then_status(&self, status: JobStatus) {
        self.push(Scripted::Status(status, None));
    }

    /// Queue a status request failure.
    pub fn then_unavailable(&self) {
        self.push(Scripted::Unavailable);
    }

    /// Answer the next submissions with a terminal status.
    pub fn respond_synchronously(&self, status: JobStatus, message: Option<&str>) {
        self.state.lock().unwrap().synchronous = Some((status, message.map(str::to_string)));
    }

    pub fn reject_submissions(&self, reject: bool) {
        self.state.lock().unwrap().reject = reject;
    }

    pub fn submit_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn last_request(&self) -> Option<AnalysisRequest> {
        self.state.lock().unwrap().requests.last().cloned()
    }

    pub fn status_calls(&self) -> u32 {
        self.state.lock().unwrap().status_calls
    }

    fn push(&self, entry: Scripted) {
        self.state.lock().unwrap().script.push_back(entry);
    }
}

#[async_trait]
impl AnalysisService for FakeAnalysis {
    async fn submit(&self, request: &AnalysisRequest) -> AnalysisResult<SubmitResponse> {
        let mut state = self.state.lock().unwrap();
        if state.reject {
            return Err(AnalysisError::Rejected(422, "source not reachable".to_string()));
        }
        state.requests.push(request.clone());
        let job_id = JobId::from_string(format!("job-{}", state.requests.len()));

        let (status, error_message) = state
            .synchronous
            .clone()
            .unwrap_or((JobStatus::Queued, None));
        Ok(SubmitResponse {
            job_id,
            status,
            error_message,
        })
    }

    async fn status(&self, _job_id: &JobId) -> AnalysisResult<JobStatusReport> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;
        match state.script.pop_front() {
            Some(Scripted::Status(status, error_message)) => Ok(JobStatusReport {
                status,
                error_message,
                timing: None,
            }),
            Some(Scripted::Unavailable) => {
                Err(AnalysisError::ServiceUnavailable("503: busy".to_string()))
            }
            None => Ok(JobStatusReport {
                status: JobStatus::Running,
                error_message: None,
                timing: None,
            }),
        }
    }

    async fn health_check(&self) -> AnalysisResult<bool> {
        Ok(true)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A registered asset owned by `user-1` with a resolvable source.
pub fn asset(id: &str, duration_secs: Option<f64>) -> MediaAsset {
    let upload = UploadResult {
        external_id: format!("ext-{}", id),
        playback_url: format!("https://stream.test/ext-{}.m3u8", id),
        thumbnail_url_template: format!("https://img.test/ext-{}/thumbnail.jpg?time={{time}}", id),
        file_name: format!("{}.mp4", id),
        content_type: "video/mp4".to_string(),
        size_bytes: 10 * 1024 * 1024,
        duration_secs,
    };
    let mut asset = MediaAsset::from_upload("user-1", &upload).unwrap();
    asset.id = MediaAssetId::from(id);
    asset
}

/// `n` consecutive 10-second clips produced by `job_id`.
pub fn clips(job_id: &str, asset_id: &MediaAssetId, n: usize) -> Vec<Clip> {
    (0..n)
        .map(|i| {
            let start = i as f64 * 10.0;
            Clip::new(
                format!("{}-clip-{}", job_id, i),
                JobId::from(job_id),
                asset_id.clone(),
                start,
                start + 10.0,
                format!("Moment {}", i + 1),
            )
            .unwrap()
        })
        .collect()
}
