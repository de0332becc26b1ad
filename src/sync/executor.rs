//! `SyncExecutor` (spec §4.4): two bounded-concurrency queues — uploads and
//! downloads — with retry/backoff, at-most-one-in-flight-per-fileId
//! deduplication, cancellation, and coalesced progress reporting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;
use crate::db::local_state::TransferStatus;
use crate::error::{FileSyncError, Result};
use crate::local_storage::LocalFileStorage;
use crate::metadata::{FileUpdated, MetadataStore};
use crate::remote::{DownloadOpts, Progress, RemoteStorage, UploadOpts};
use crate::state::{LocalFileStateManager, TransferKind};

/// A single coalesced progress sample for one fileId's transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferProgress {
    pub kind: TransferKind,
    pub loaded: u64,
    pub total: Option<u64>,
}

pub type SyncProgressSink = Arc<dyn Fn(&str, TransferProgress) + Send + Sync>;

const PROGRESS_COALESCE: Duration = Duration::from_millis(100);

type InflightKey = (TransferKind, String);

pub struct SyncExecutor<M: MetadataStore> {
    config: ExecutorConfig,
    remote: Arc<RemoteStorage>,
    local: Arc<LocalFileStorage>,
    metadata: Arc<M>,
    state: Arc<LocalFileStateManager>,
    upload_sem: Arc<tokio::sync::Semaphore>,
    download_sem: Arc<tokio::sync::Semaphore>,
    inflight: Mutex<HashMap<InflightKey, CancellationToken>>,
    last_emit: Arc<Mutex<HashMap<String, Instant>>>,
    progress: Option<SyncProgressSink>,
}

impl<M: MetadataStore> SyncExecutor<M> {
    pub fn new(
        config: ExecutorConfig,
        remote: Arc<RemoteStorage>,
        local: Arc<LocalFileStorage>,
        metadata: Arc<M>,
        state: Arc<LocalFileStateManager>,
        progress: Option<SyncProgressSink>,
    ) -> Self {
        let upload_sem = Arc::new(tokio::sync::Semaphore::new(config.max_concurrent_uploads));
        let download_sem = Arc::new(tokio::sync::Semaphore::new(config.max_concurrent_downloads));
        Self {
            config,
            remote,
            local,
            metadata,
            state,
            upload_sem,
            download_sem,
            inflight: Mutex::new(HashMap::new()),
            last_emit: Arc::new(Mutex::new(HashMap::new())),
            progress,
        }
    }

    /// Submit an upload job for `file_id`. A no-op if one is already in flight
    /// for this `(upload, fileId)` key (spec §4.4 at-most-one-in-flight).
    pub fn submit_upload(self: &Arc<Self>, file_id: String, stored_path: String, remote_key: String) {
        let key = (TransferKind::Upload, file_id.clone());
        let Some(cancel) = self.register_inflight(key.clone()) else {
            return;
        };

        let _ = self
            .state
            .set_status(&file_id, TransferKind::Upload, TransferStatus::Queued, None);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let permit = this.upload_sem.clone().acquire_owned().await;
            let Ok(_permit) = permit else { return };

            let _ = this
                .state
                .set_status(&file_id, TransferKind::Upload, TransferStatus::InProgress, None);

            let outcome = this.run_upload(&file_id, &stored_path, &remote_key, &cancel).await;
            this.finish(&file_id, TransferKind::Upload, outcome);
            this.inflight.lock().unwrap().remove(&key);
        });
    }

    /// Submit a download job for `file_id`. A no-op if one is already in
    /// flight for this `(download, fileId)` key.
    pub fn submit_download(self: &Arc<Self>, file_id: String, stored_path: String, remote_key: String) {
        let key = (TransferKind::Download, file_id.clone());
        let Some(cancel) = self.register_inflight(key.clone()) else {
            return;
        };

        let _ = self
            .state
            .set_status(&file_id, TransferKind::Download, TransferStatus::Queued, None);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let permit = this.download_sem.clone().acquire_owned().await;
            let Ok(_permit) = permit else { return };

            let _ = this
                .state
                .set_status(&file_id, TransferKind::Download, TransferStatus::InProgress, None);

            let outcome = this.run_download(&file_id, &stored_path, &remote_key, &cancel).await;
            this.finish(&file_id, TransferKind::Download, outcome);
            this.inflight.lock().unwrap().remove(&key);
        });
    }

    /// Best-effort remote delete (spec §4.5: `deleteFile` schedules this via
    /// the executor; spec §5 says `fileDeleted` may commit before the remote
    /// delete completes). Failures are logged, never propagated — the caller
    /// already committed the soft-delete.
    pub fn schedule_delete(self: &Arc<Self>, remote_key: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.remote.delete(&remote_key).await {
                log::warn!("best-effort remote delete of {remote_key} failed: {e}");
            }
        });
    }

    /// Cancel any in-flight upload or download for `file_id` (spec §5: a
    /// `fileDeleted` event cancels outstanding transfers for that fileId).
    pub fn cancel_file(&self, file_id: &str) {
        let inflight = self.inflight.lock().unwrap();
        for kind in [TransferKind::Upload, TransferKind::Download] {
            if let Some(token) = inflight.get(&(kind, file_id.to_string())) {
                token.cancel();
            }
        }
    }

    /// Cancel every in-flight transfer (disposal per spec §5).
    pub fn cancel_all(&self) {
        for token in self.inflight.lock().unwrap().values() {
            token.cancel();
        }
    }

    fn register_inflight(&self, key: InflightKey) -> Option<CancellationToken> {
        let mut inflight = self.inflight.lock().unwrap();
        if inflight.contains_key(&key) {
            return None;
        }
        let token = CancellationToken::new();
        inflight.insert(key, token.clone());
        Some(token)
    }

    fn finish(&self, file_id: &str, kind: TransferKind, outcome: Result<()>) {
        match outcome {
            Ok(()) => {
                let _ = self.state.set_status(file_id, kind, TransferStatus::Done, None);
            }
            Err(FileSyncError::Cancelled) => {
                let _ = self.state.set_status(file_id, kind, TransferStatus::Idle, None);
            }
            Err(e) => {
                let _ = self
                    .state
                    .set_status(file_id, kind, TransferStatus::Error, Some(&e.to_string()));
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.config.base_delay_ms.saturating_mul(1u64 << attempt.min(32));
        let capped = exp.min(self.config.max_delay_ms);
        let jitter = if self.config.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.config.jitter_ms)
        };
        Duration::from_millis(capped + jitter)
    }

    async fn run_upload(
        &self,
        file_id: &str,
        stored_path: &str,
        remote_key: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let bytes = self.local.read(stored_path).await?;
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(FileSyncError::Cancelled);
            }

            let opts = UploadOpts {
                content_type: None,
                on_progress: self.progress_sink_for(file_id, TransferKind::Upload),
            };

            match self.remote.upload(&bytes, remote_key, opts, cancel).await {
                Ok(_outcome) => {
                    let row = self
                        .metadata
                        .get(file_id)
                        .await?
                        .ok_or_else(|| FileSyncError::NotFound(file_id.to_string()))?;
                    // `updateFile` doesn't cancel an in-flight upload (only `deleteFile`
                    // does, via `cancel_file`), so the row may have moved to a new
                    // path/contentHash while these bytes were in transit. Committing
                    // `remote_key` against that newer row would pair it with stale
                    // bytes and break `remoteKey == path - filesRoot/`. The row's own
                    // reconciliation already queued an upload for the new content, so
                    // just drop this stale result.
                    if row.path != stored_path {
                        log::info!(
                            "upload of {file_id} finished for {stored_path} but the file has \
                             since moved to {}; not committing remote_key",
                            row.path
                        );
                        return Ok(());
                    }
                    self.metadata
                        .commit_updated(FileUpdated {
                            id: file_id.to_string(),
                            path: row.path,
                            remote_key: Some(remote_key.to_string()),
                            content_hash: row.content_hash,
                            size: None,
                            updated_at: chrono::Utc::now().timestamp(),
                        })
                        .await?;
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let _ = self
                        .state
                        .set_status(file_id, TransferKind::Upload, TransferStatus::Queued, Some(&e.to_string()));
                    self.sleep_or_cancel(self.backoff(attempt), cancel).await?;
                    let _ = self
                        .state
                        .set_status(file_id, TransferKind::Upload, TransferStatus::InProgress, None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_download(
        &self,
        file_id: &str,
        stored_path: &str,
        remote_key: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(FileSyncError::Cancelled);
            }

            let opts = DownloadOpts {
                on_progress: self.progress_sink_for(file_id, TransferKind::Download),
                if_none_match: None,
            };

            match self.remote.download(remote_key, opts, cancel).await {
                Ok(bytes) => {
                    self.local.write(stored_path, &bytes).await?;
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let _ = self.state.set_status(
                        file_id,
                        TransferKind::Download,
                        TransferStatus::Queued,
                        Some(&e.to_string()),
                    );
                    self.sleep_or_cancel(self.backoff(attempt), cancel).await?;
                    let _ = self
                        .state
                        .set_status(file_id, TransferKind::Download, TransferStatus::InProgress, None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn sleep_or_cancel(&self, delay: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => Err(FileSyncError::Cancelled),
        }
    }

    /// Build a per-transfer progress sink that coalesces emissions to at most
    /// once per 100ms per fileId (spec §4.4).
    fn progress_sink_for(&self, file_id: &str, kind: TransferKind) -> Option<crate::remote::ProgressSink> {
        let sink = self.progress.clone()?;
        let last_emit = Arc::clone(&self.last_emit);
        // A fresh attempt's first sample always gets through.
        last_emit.lock().unwrap().remove(file_id);

        let file_id = file_id.to_string();
        Some(Arc::new(move |p: Progress| {
            let mut last = last_emit.lock().unwrap();
            let now = Instant::now();
            let should_emit = match last.get(&file_id) {
                Some(t) => now.duration_since(*t) >= PROGRESS_COALESCE,
                None => true,
            };
            if should_emit {
                last.insert(file_id.clone(), now);
                drop(last);
                sink(
                    &file_id,
                    TransferProgress {
                        kind,
                        loaded: p.loaded,
                        total: p.total,
                    },
                );
            }
        }))
    }
}
