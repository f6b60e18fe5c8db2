//! Upload coordinator.
//!
//! Moves one local file to blob storage in bounded chunks. Each chunk waits
//! for its acknowledgement before the next is read. A transient failure
//! backs off, asks the remote side for its committed offset and resumes
//! from there instead of restarting.

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use clipflow_models::{MediaKind, UploadResult, UploadSession};
use clipflow_storage::{
    ChunkRange, DeliveryConfig, RemoteSession, StorageResult, UploadTarget, UploadTransport,
};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics::{record_chunk_retry, record_upload};
use crate::retry::{sleep_or_cancel, RetryConfig};

/// A local recording to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub path: PathBuf,
    /// Name presented to storage; defaults to the file name
    pub display_name: Option<String>,
    /// MIME type; guessed from the extension when absent
    pub content_type: Option<String>,
    /// Duration in seconds, if the caller knows it
    pub duration_secs: Option<f64>,
}

impl MediaFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            display_name: None,
            content_type: None,
            duration_secs: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    fn file_name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| {
                self.path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "upload".to_string())
    }
}

/// Releases the coordinator slot when an upload ends, however it ends.
struct SlotGuard<'a> {
    slot: &'a Mutex<Option<UploadSession>>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        lock_slot(self.slot).take();
    }
}

fn lock_slot(slot: &Mutex<Option<UploadSession>>) -> MutexGuard<'_, Option<UploadSession>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Resumable, chunked uploader owning at most one active session.
pub struct UploadCoordinator {
    transport: Arc<dyn UploadTransport>,
    delivery: DeliveryConfig,
    config: PipelineConfig,
    slot: Mutex<Option<UploadSession>>,
}

impl UploadCoordinator {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        delivery: DeliveryConfig,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transport,
            delivery,
            config,
            slot: Mutex::new(None),
        }
    }

    /// Whether an upload currently owns the slot.
    pub fn is_busy(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    /// Progress of the active upload, if any.
    pub fn current_progress(&self) -> Option<u8> {
        lock_slot(&self.slot).as_ref().map(|s| s.progress_percent())
    }

    /// Upload `file`, reporting monotonically increasing progress.
    ///
    /// A second call while an upload is in flight fails with
    /// `UploadInProgress`.
    pub async fn begin(
        &self,
        file: &MediaFile,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(u8) + Send,
    ) -> PipelineResult<UploadResult> {
        let _guard = self.claim_slot(file)?;

        let (total_bytes, content_type) = validate(file).await?;
        let file_name = file.file_name();

        let span = info_span!("upload", file = %file_name, total_bytes);
        let result = async {
            {
                let mut slot = lock_slot(&self.slot);
                if let Some(session) = slot.as_mut() {
                    *session =
                        UploadSession::new(&file.path, &file_name, &content_type, total_bytes);
                }
            }
            on_progress(0);

            let target = UploadTarget {
                file_name: file_name.clone(),
                content_type: content_type.clone(),
                total_bytes,
            };
            self.transfer(file, &target, cancel, &mut on_progress).await
        }
        .instrument(span)
        .await;

        match result {
            Ok(stored_id) => {
                self.with_session(|s| s.complete());
                record_upload("completed");
                info!(file = %file_name, external_id = %stored_id, total_bytes, "Upload completed");

                Ok(UploadResult {
                    playback_url: self.delivery.playback_url(&stored_id),
                    thumbnail_url_template: self.delivery.thumbnail_url_template(&stored_id),
                    external_id: stored_id,
                    file_name,
                    content_type,
                    size_bytes: total_bytes,
                    duration_secs: file.duration_secs,
                })
            }
            Err(e) => {
                self.with_session(|s| s.fail());
                let outcome = match e {
                    PipelineError::Cancelled => "cancelled",
                    _ => "failed",
                };
                record_upload(outcome);
                warn!(file = %file_name, error = %e, "Upload did not complete");
                Err(e)
            }
        }
    }

    fn claim_slot(&self, file: &MediaFile) -> PipelineResult<SlotGuard<'_>> {
        let mut slot = lock_slot(&self.slot);
        if slot.as_ref().is_some_and(|s| s.is_active()) {
            return Err(PipelineError::UploadInProgress);
        }
        *slot = Some(UploadSession::new(&file.path, file.file_name(), "", 0));
        Ok(SlotGuard { slot: &self.slot })
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut UploadSession) -> R) -> Option<R> {
        lock_slot(&self.slot).as_mut().map(f)
    }

    fn acknowledge(&self, committed_offset: u64) -> PipelineResult<u8> {
        self.with_session(|s| {
            s.acknowledge(committed_offset)
                .map(|_| s.progress_percent())
                .map_err(|e| PipelineError::upload_failed(e.to_string()))
        })
        .unwrap_or(Ok(0))
    }

    fn retry_config(&self, operation: &str) -> RetryConfig {
        RetryConfig::new(operation)
            .with_max_retries(self.config.max_chunk_retries)
            .with_base_delay(self.config.upload_retry_base)
            .with_max_delay(self.config.upload_retry_max)
    }

    /// Returns the external ID of the finalized object.
    async fn transfer(
        &self,
        file: &MediaFile,
        target: &UploadTarget,
        cancel: &CancellationToken,
        on_progress: &mut (impl FnMut(u8) + Send),
    ) -> PipelineResult<String> {
        let mut remote = self
            .retry_transient("create_session", cancel, || self.transport.create_session(target))
            .await?;
        self.with_session(|s| s.attach(remote.upload_id.clone()));
        info!(upload_id = %remote.upload_id, "Upload session opened");

        let mut reader = tokio::fs::File::open(&file.path).await?;
        let retry = self.retry_config("upload_chunk");
        let chunk_size = self.config.chunk_size_bytes;
        let total = target.total_bytes;

        let mut offset = 0u64;
        let mut failures = 0u32;
        let mut reported = 0u8;

        while offset < total {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let Some(range) = ChunkRange::next(offset, total, chunk_size) else {
                break;
            };
            let data = read_chunk(&mut reader, range).await?;

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                r = self.transport.upload_chunk(&mut remote, range, data) => r,
            };

            let (failure, hint) = match sent {
                Ok(ack) if ack.committed_offset > offset => {
                    let percent = self.acknowledge(ack.committed_offset)?;
                    offset = ack.committed_offset;
                    failures = 0;
                    if percent > reported {
                        reported = percent;
                        on_progress(percent);
                    }
                    continue;
                }
                Ok(_) => (
                    format!("chunk {} at offset {} made no progress", range.index, offset),
                    None,
                ),
                Err(e) if e.is_transient() => (e.to_string(), e.retry_after()),
                Err(e) => return Err(PipelineError::upload_failed(e.to_string())),
            };

            failures += 1;
            record_chunk_retry();
            if !retry.allows(failures) {
                return Err(PipelineError::upload_failed(format!(
                    "chunk {} failed after {} attempts: {}",
                    range.index, failures, failure
                )));
            }

            let delay = hint.unwrap_or_else(|| retry.delay_for_attempt(failures));
            warn!(
                chunk = range.index,
                offset,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Chunk upload failed, resuming after backoff"
            );
            sleep_or_cancel(delay, cancel).await?;

            offset = self.resume_offset(&mut remote, offset).await?;
        }

        if self.with_session(|s| s.is_fully_acknowledged()) == Some(false) {
            return Err(PipelineError::upload_failed(
                "upload ended before every byte was acknowledged",
            ));
        }

        let stored = self
            .retry_transient("finish", cancel, || self.transport.finish(&remote))
            .await?;
        Ok(stored.external_id)
    }

    /// Ask the remote side where to resume; falls back to the last
    /// acknowledged offset if the query itself fails transiently.
    async fn resume_offset(
        &self,
        remote: &mut RemoteSession,
        acknowledged: u64,
    ) -> PipelineResult<u64> {
        match self.transport.committed_offset(remote).await {
            Ok(committed) if committed > acknowledged => {
                self.acknowledge(committed)?;
                Ok(committed)
            }
            Ok(committed) if committed < acknowledged => Err(PipelineError::upload_failed(format!(
                "remote committed offset regressed from {} to {}",
                acknowledged, committed
            ))),
            Ok(_) => Ok(acknowledged),
            Err(e) if e.is_transient() => {
                warn!(offset = acknowledged, error = %e, "Committed offset query failed");
                Ok(acknowledged)
            }
            Err(e) => Err(PipelineError::upload_failed(e.to_string())),
        }
    }

    async fn retry_transient<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> PipelineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let retry = self.retry_config(operation);
        let mut failures = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                r = op() => r,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if !retry.allows(failures) {
                        return Err(PipelineError::upload_failed(format!(
                            "{} failed after {} attempts: {}",
                            operation, failures, e
                        )));
                    }
                    warn!(
                        operation,
                        attempt = failures,
                        error = %e,
                        "Transient storage error, retrying"
                    );
                    let delay = e
                        .retry_after()
                        .unwrap_or_else(|| retry.delay_for_attempt(failures));
                    sleep_or_cancel(delay, cancel).await?;
                }
                Err(e) => return Err(PipelineError::upload_failed(e.to_string())),
            }
        }
    }
}

/// Local checks made before any network call. Returns size and MIME type.
async fn validate(file: &MediaFile) -> PipelineResult<(u64, String)> {
    let metadata = tokio::fs::metadata(&file.path).await.map_err(|e| {
        PipelineError::validation(format!("Cannot read {}: {}", file.path.display(), e))
    })?;

    if !metadata.is_file() {
        return Err(PipelineError::validation(format!("{} is not a file", file.path.display())));
    }
    if metadata.len() == 0 {
        return Err(PipelineError::validation("File is empty"));
    }

    let content_type = resolve_content_type(file.content_type.as_deref(), &file.path)?;
    MediaKind::from_content_type(&content_type)
        .map_err(|e| PipelineError::validation(e.to_string()))?;

    Ok((metadata.len(), content_type))
}

fn resolve_content_type(declared: Option<&str>, path: &Path) -> PipelineResult<String> {
    declared
        .map(str::to_string)
        .or_else(|| MediaKind::guess_content_type(path))
        .ok_or_else(|| {
            PipelineError::validation(format!(
                "Cannot determine the media type of {}",
                path.display()
            ))
        })
}

async fn read_chunk(reader: &mut tokio::fs::File, range: ChunkRange) -> PipelineResult<Vec<u8>> {
    reader.seek(SeekFrom::Start(range.offset)).await?;
    let mut buf = vec![0u8; range.len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeTransport;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn media_file(bytes: usize, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        let data: Vec<u8> = (0..bytes).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        file
    }

    fn coordinator(transport: Arc<FakeTransport>, chunk_size: u64) -> UploadCoordinator {
        let config = PipelineConfig {
            chunk_size_bytes: chunk_size,
            upload_retry_base: Duration::from_millis(10),
            max_chunk_retries: 3,
            ..Default::default()
        };
        UploadCoordinator::new(transport, DeliveryConfig::default(), config)
    }

    #[tokio::test]
    async fn test_uploads_every_byte() {
        let file = media_file(1000, ".mp4");
        let transport = Arc::new(FakeTransport::new());
        let uploader = coordinator(transport.clone(), 300);

        let mut progress = Vec::new();
        let result = uploader
            .begin(&MediaFile::new(file.path()), &CancellationToken::new(), |p| progress.push(p))
            .await
            .unwrap();

        assert_eq!(result.size_bytes, 1000);
        assert_eq!(result.content_type, "video/mp4");
        assert!(result.playback_url.ends_with(&format!("{}.m3u8", result.external_id)));
        assert_eq!(transport.stored_bytes(), std::fs::read(file.path()).unwrap());
        assert_eq!(transport.chunk_offsets(), vec![0, 300, 600, 900]);
        assert_eq!(progress, vec![0, 30, 60, 90, 100]);
        assert!(!uploader.is_busy());
    }

    #[tokio::test]
    async fn test_rejects_empty_and_unsupported_files() {
        let transport = Arc::new(FakeTransport::new());
        let uploader = coordinator(transport.clone(), 300);

        let empty = media_file(0, ".mp4");
        let err = uploader
            .begin(&MediaFile::new(empty.path()), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));

        let text = media_file(10, ".txt");
        let err = uploader
            .begin(&MediaFile::new(text.path()), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));

        assert_eq!(transport.sessions_created(), 0);
        assert!(!uploader.is_busy());
    }

    #[tokio::test]
    async fn test_declared_content_type_wins() {
        let file = media_file(10, ".bin");
        let transport = Arc::new(FakeTransport::new());
        let uploader = coordinator(transport, 300);

        let media = MediaFile::new(file.path())
            .with_content_type("audio/mpeg")
            .with_display_name("ep1.mp3");
        let result = uploader
            .begin(&media, &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(result.file_name, "ep1.mp3");
        assert_eq!(result.content_type, "audio/mpeg");
    }

    #[tokio::test]
    async fn test_second_begin_is_rejected() {
        let file = media_file(10, ".mp4");
        let uploader = coordinator(Arc::new(FakeTransport::new()), 300);
        *lock_slot(&uploader.slot) =
            Some(UploadSession::new(file.path(), "other.mp4", "video/mp4", 10));

        let err = uploader
            .begin(&MediaFile::new(file.path()), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UploadInProgress));
        assert!(uploader.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumes_from_committed_offset() {
        let file = media_file(1000, ".mp4");
        let transport = Arc::new(FakeTransport::new().fail_chunk(2, 1));
        let uploader = coordinator(transport.clone(), 100);

        let result = uploader
            .begin(&MediaFile::new(file.path()), &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(result.size_bytes, 1000);
        assert_eq!(
            transport.chunk_offsets(),
            vec![0, 100, 200, 200, 300, 400, 500, 600, 700, 800, 900]
        );
        assert_eq!(transport.committed_queries(), 1);
        assert_eq!(transport.stored_bytes().len(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_chunk_waits_for_retry_after() {
        let file = media_file(300, ".mp4");
        let transport = Arc::new(FakeTransport::new().rate_limit_chunk(1, 5));
        let uploader = coordinator(transport.clone(), 100);

        let started = tokio::time::Instant::now();
        uploader
            .begin(&MediaFile::new(file.path()), &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(transport.chunk_offsets(), vec![0, 100, 100, 200]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_bounded_retries() {
        let file = media_file(500, ".mp4");
        let transport = Arc::new(FakeTransport::new().fail_chunk(1, 10));
        let uploader = coordinator(transport.clone(), 100);

        let err = uploader
            .begin(&MediaFile::new(file.path()), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UploadFailed(_)));
        // Initial attempt plus three retries.
        assert_eq!(transport.chunk_offsets(), vec![0, 100, 100, 100, 100]);
        assert!(!uploader.is_busy());
    }

    #[tokio::test]
    async fn test_permanent_error_fails_immediately() {
        let file = media_file(500, ".mp4");
        let transport = Arc::new(FakeTransport::new().reject_chunk(1));
        let uploader = coordinator(transport.clone(), 100);

        let err = uploader
            .begin(&MediaFile::new(file.path()), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UploadFailed(_)));
        assert_eq!(transport.chunk_offsets(), vec![0, 100]);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_chunk() {
        let file = media_file(500, ".mp4");
        let transport = Arc::new(FakeTransport::new());
        let uploader = coordinator(transport.clone(), 100);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = uploader
            .begin(&MediaFile::new(file.path()), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(transport.chunk_offsets().is_empty());
        assert!(!uploader.is_busy());
    }
}
