//! The seam onto the event-sourced, replicated metadata store that owns the
//! `File` table. The engine never implements this store itself (spec
//! Non-goals) — it only subscribes to and commits against it.

pub mod in_memory;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A replicated row, produced exclusively by the three synced events below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRow {
    pub id: String,
    pub path: String,
    pub remote_key: Option<String>,
    pub content_hash: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl FileRow {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// `v1.FileCreated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCreated {
    pub id: String,
    pub path: String,
    pub content_hash: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// `v1.FileUpdated` — sets `remoteKey` and/or new path+hash after content change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUpdated {
    pub id: String,
    pub path: String,
    pub remote_key: Option<String>,
    pub content_hash: String,
    pub size: Option<u64>,
    pub updated_at: i64,
}

/// `v1.FileDeleted`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDeleted {
    pub id: String,
    pub deleted_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FileEvent {
    Created(FileCreated),
    Updated(FileUpdated),
    Deleted(FileDeleted),
}

/// Seam onto the replicated metadata store's `files` table.
///
/// `commit_*` are the only way rows are ever produced; `subscribe` hands back
/// a watch channel of the full current table so downstream components
/// (`LocalFileStateManager`, `FileSync`) can re-derive state whenever it changes,
/// matching the event-sourced reconciliation model of the source system.
#[allow(async_fn_in_trait)]
pub trait MetadataStore: Send + Sync + 'static {
    async fn commit_created(&self, event: FileCreated) -> crate::error::Result<()>;
    async fn commit_updated(&self, event: FileUpdated) -> crate::error::Result<()>;
    async fn commit_deleted(&self, event: FileDeleted) -> crate::error::Result<()>;

    async fn get(&self, file_id: &str) -> crate::error::Result<Option<FileRow>>;
    async fn list(&self) -> crate::error::Result<Vec<FileRow>>;

    /// A watch receiver that fires whenever the table changes. Replicated
    /// events may arrive in any order relative to local byte availability;
    /// subscribers must tolerate re-deriving from whatever rows are present.
    fn subscribe(&self) -> watch::Receiver<Vec<FileRow>>;
}
