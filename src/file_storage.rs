//! `FileStorage` (spec §4.5): the user-facing façade over the content-addressed
//! local pool and the replicated `File` table. `saveFile`/`updateFile`/
//! `deleteFile` write local bytes before committing the corresponding event
//! (spec §5 ordering guarantee); transfers themselves are left to the
//! [`crate::sync::executor::SyncExecutor`] reacting to the table change this
//! produces.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::operations::{NewOperation, OperationStatus, OperationType};
use crate::db::DbManager;
use crate::error::{FileSyncError, Result};
use crate::input_file::InputFile;
use crate::local_storage::{stored_path, LocalFileStorage};
use crate::metadata::{FileCreated, FileDeleted, FileUpdated, MetadataStore};
use crate::sync::executor::SyncExecutor;

/// Returned by [`FileStorage::save_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct SavedFile {
    pub file_id: String,
    pub path: String,
    pub content_hash: String,
}

/// Returned by [`FileStorage::update_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedFile {
    pub path: String,
    pub content_hash: String,
}

/// The façade a host application calls directly. One instance is scoped to a
/// single store (`storeId`), since that's what every stored path is rooted
/// under (spec §4.1 path policy).
pub struct FileStorage<M: MetadataStore> {
    store_id: String,
    local: Arc<LocalFileStorage>,
    metadata: Arc<M>,
    db: DbManager,
    executor: Arc<SyncExecutor<M>>,
}

impl<M: MetadataStore> FileStorage<M> {
    pub fn new(
        store_id: impl Into<String>,
        local: Arc<LocalFileStorage>,
        metadata: Arc<M>,
        db: DbManager,
        executor: Arc<SyncExecutor<M>>,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            local,
            metadata,
            db,
            executor,
        }
    }

    /// (1) hash bytes; (2) write to `filesRoot/storeId/hash` if absent; (3)
    /// mint a fileId; (4) commit `fileCreated`. Saving identical bytes twice
    /// yields two distinct fileIds sharing one path (spec §4.5 idempotence —
    /// dedup happens at the byte layer, not the identity layer).
    pub async fn save_file(&self, file: &InputFile) -> Result<SavedFile> {
        let bytes = file.bytes().await?;
        let content_hash = crate::hash::hash_bytes_async(bytes.clone()).await?;
        let path = stored_path(&self.store_id, &content_hash);
        self.local.write(&path, &bytes).await?;

        let file_id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        self.metadata
            .commit_created(FileCreated {
                id: file_id.clone(),
                path: path.clone(),
                content_hash: content_hash.clone(),
                size: bytes.len() as u64,
                mime_type: file.content_type().map(str::to_string),
                created_at: now,
                updated_at: now,
            })
            .await?;

        let _ = self.db.log_operation(&NewOperation {
            file_id: file_id.clone(),
            operation: OperationType::SaveFile,
            size: Some(bytes.len() as i64),
            status: OperationStatus::Completed,
        });

        log::info!("saved file {file_id} at {path}");
        Ok(SavedFile {
            file_id,
            path,
            content_hash,
        })
    }

    /// Replaces `fileId`'s content: hashes and writes the new bytes, commits
    /// `fileUpdated` with a cleared `remoteKey` (the executor re-uploads the
    /// new content once the table change reaches it), then GCs the old path
    /// if no other non-deleted row still references its content hash.
    pub async fn update_file(&self, file_id: &str, new_file: &InputFile) -> Result<UpdatedFile> {
        let row = self
            .metadata
            .get(file_id)
            .await?
            .ok_or_else(|| FileSyncError::NotFound(file_id.to_string()))?;

        let bytes = new_file.bytes().await?;
        let content_hash = crate::hash::hash_bytes_async(bytes.clone()).await?;
        let new_path = stored_path(&self.store_id, &content_hash);
        self.local.write(&new_path, &bytes).await?;

        let now = chrono::Utc::now().timestamp();
        self.metadata
            .commit_updated(FileUpdated {
                id: file_id.to_string(),
                path: new_path.clone(),
                remote_key: None,
                content_hash: content_hash.clone(),
                size: Some(bytes.len() as u64),
                updated_at: now,
            })
            .await?;

        if row.path != new_path {
            self.gc_path_if_unreferenced(&row.path, &row.content_hash)
                .await?;
        }

        let _ = self.db.log_operation(&NewOperation {
            file_id: file_id.to_string(),
            operation: OperationType::UpdateFile,
            size: Some(bytes.len() as i64),
            status: OperationStatus::Completed,
        });

        log::info!("updated file {file_id} to {new_path}");
        Ok(UpdatedFile {
            path: new_path,
            content_hash,
        })
    }

    /// Commits `fileDeleted` (soft delete), cancels any in-flight transfer for
    /// `fileId`, schedules a best-effort remote delete if a `remoteKey` was
    /// ever set, and unlinks the local path if no other non-deleted row
    /// shares its content hash.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let row = self
            .metadata
            .get(file_id)
            .await?
            .ok_or_else(|| FileSyncError::NotFound(file_id.to_string()))?;

        let now = chrono::Utc::now().timestamp();
        self.metadata
            .commit_deleted(FileDeleted {
                id: file_id.to_string(),
                deleted_at: now,
            })
            .await?;

        self.executor.cancel_file(file_id);

        if let Some(remote_key) = &row.remote_key {
            self.executor.schedule_delete(remote_key.clone());
        }

        self.gc_path_if_unreferenced(&row.path, &row.content_hash)
            .await?;

        let _ = self.db.log_operation(&NewOperation {
            file_id: file_id.to_string(),
            operation: OperationType::DeleteFile,
            size: None,
            status: OperationStatus::Completed,
        });

        log::info!("deleted file {file_id}");
        Ok(())
    }

    /// Prefers a local URL when bytes are present; otherwise still returns a
    /// stored-path URL, since the read path ([`crate::read_path`]) resolves
    /// either case at request time rather than this façade distinguishing
    /// them up front (spec §4.5, §4.6).
    pub async fn get_file_url(&self, file_id: &str) -> Result<Option<String>> {
        let Some(row) = self.metadata.get(file_id).await? else {
            return Ok(None);
        };
        if row.is_deleted() {
            return Ok(None);
        }
        Ok(Some(self.local.get_file_url(&row.path)))
    }

    /// A path is unlinked only when no non-deleted `File` row shares its
    /// content hash (spec §4.5 reference counting for GC).
    async fn gc_path_if_unreferenced(&self, path: &str, content_hash: &str) -> Result<()> {
        let rows = self.metadata.list().await?;
        let still_referenced = rows
            .iter()
            .any(|r| !r.is_deleted() && r.content_hash == content_hash);
        if !still_referenced {
            self.local.delete(path).await?;
            log::debug!("gc'd unreferenced path {path}");
        }
        Ok(())
    }
}
