//! `LocalFileStateManager` (spec §4.3): derives each fileId's transfer status
//! by joining on-disk presence against the replicated `File` row, and
//! persists the result to the client-local `local_file_state` table. Never
//! mutates bytes — only the [`crate::sync::executor::SyncExecutor`] does that.

use std::sync::Arc;

use crate::db::local_state::{LocalFileState, TransferStatus};
use crate::db::DbManager;
use crate::error::Result;
use crate::local_storage::LocalFileStorage;
use crate::metadata::FileRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    Upload,
    Download,
}

/// A newly-admitted transfer, produced by [`LocalFileStateManager::reconcile`]
/// the moment a fileId's status flips `idle -> pending`.
#[derive(Debug, Clone)]
pub struct PendingJob {
    pub file_id: String,
    pub kind: TransferKind,
}

pub struct LocalFileStateManager {
    db: DbManager,
    local: Arc<LocalFileStorage>,
}

impl LocalFileStateManager {
    pub fn new(db: DbManager, local: Arc<LocalFileStorage>) -> Self {
        Self { db, local }
    }

    pub fn get(&self, file_id: &str) -> Result<Option<LocalFileState>> {
        self.db.get_local_file_state(file_id)
    }

    pub fn list(&self) -> Result<Vec<LocalFileState>> {
        self.db.list_local_file_state()
    }

    /// Re-derive the desired status for every row in `rows`, persist it, and
    /// return the set of fileIds that just transitioned `idle -> pending` and
    /// so need to be submitted to the executor. Non-leaders still track state
    /// but never produce pending jobs (spec §4.3 leader election).
    pub async fn reconcile(&self, rows: &[FileRow], is_leader: bool) -> Result<Vec<PendingJob>> {
        let mut pending = Vec::new();

        for row in rows {
            if row.is_deleted() {
                continue;
            }

            let mut state = self
                .db
                .get_local_file_state(&row.id)?
                .unwrap_or_else(|| LocalFileState {
                    file_id: row.id.clone(),
                    path: row.path.clone(),
                    local_hash: String::new(),
                    upload_status: TransferStatus::Idle,
                    download_status: TransferStatus::Idle,
                    last_sync_error: String::new(),
                    updated_at: row.updated_at,
                });

            state.path = row.path.clone();

            let local_present = self.local.exists(&row.path).await;
            state.local_hash = if local_present {
                row.content_hash.clone()
            } else {
                String::new()
            };

            if is_leader {
                if local_present && row.remote_key.is_none() && state.upload_status == TransferStatus::Idle {
                    state.upload_status = TransferStatus::Pending;
                    pending.push(PendingJob {
                        file_id: row.id.clone(),
                        kind: TransferKind::Upload,
                    });
                }

                if !local_present && row.remote_key.is_some() && state.download_status == TransferStatus::Idle {
                    state.download_status = TransferStatus::Pending;
                    pending.push(PendingJob {
                        file_id: row.id.clone(),
                        kind: TransferKind::Download,
                    });
                }
            }

            state.updated_at = row.updated_at;
            self.db.upsert_local_file_state(&state)?;
        }

        Ok(pending)
    }

    pub fn set_status(
        &self,
        file_id: &str,
        kind: TransferKind,
        status: TransferStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        match kind {
            TransferKind::Upload => self.db.set_upload_status(file_id, status, error, now),
            TransferKind::Download => self.db.set_download_status(file_id, status, error, now),
        }
    }

    /// Reset a fileId's status back to `idle`, e.g. on operator request or
    /// network recovery (spec §4.3 `error -> pending` note applies via a
    /// subsequent reconcile once `idle` is reached).
    pub fn reset(&self, file_id: &str, kind: TransferKind) -> Result<()> {
        self.set_status(file_id, kind, TransferStatus::Idle, None)
    }

    pub fn forget(&self, file_id: &str) -> Result<()> {
        self.db.delete_local_file_state(file_id)
    }
}
