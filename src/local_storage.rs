//! Content-addressed local byte pool: `filesRoot/sanitize(storeId)/contentHash`.
//!
//! Identical bytes share one path, so writes are idempotent and deletes are
//! reference-counted by the caller (see [`crate::file_storage::FileStorage`]),
//! never by this module.

use std::path::PathBuf;

use crate::error::{FileSyncError, Result};

/// Fixed top-level segment every stored path lives under.
pub const FILES_ROOT: &str = "livestore-filesync-files";

/// Replace any character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_store_id(store_id: &str) -> String {
    store_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The stored path for a given store and content hash, relative to the base
/// directory: `filesRoot/sanitize(storeId)/contentHash`.
pub fn stored_path(store_id: &str, content_hash: &str) -> String {
    format!("{FILES_ROOT}/{}/{}", sanitize_store_id(store_id), content_hash)
}

/// The remote key for a stored path: the path with the `filesRoot/` prefix removed.
pub fn remote_key_for(stored_path: &str) -> Option<&str> {
    stored_path.strip_prefix(&format!("{FILES_ROOT}/"))
}

/// Content-addressed byte pool rooted at `base_dir`.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    base_dir: PathBuf,
}

impl LocalFileStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, stored_path: &str) -> PathBuf {
        self.base_dir.join(stored_path)
    }

    /// Write `bytes` at `stored_path`. Idempotent: if the path already exists
    /// (content-addressing guarantees the bytes are identical) this is a no-op.
    pub async fn write(&self, stored_path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(stored_path);
        if tokio::fs::try_exists(&full).await.unwrap_or(false) {
            return Ok(());
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(())
    }

    pub async fn read(&self, stored_path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(stored_path);
        tokio::fs::read(&full).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FileSyncError::NotFound(stored_path.to_string())
            } else {
                FileSyncError::from(e)
            }
        })
    }

    pub async fn exists(&self, stored_path: &str) -> bool {
        tokio::fs::try_exists(self.resolve(stored_path))
            .await
            .unwrap_or(false)
    }

    /// Idempotent: deleting an absent path succeeds.
    pub async fn delete(&self, stored_path: &str) -> Result<()> {
        match tokio::fs::remove_file(self.resolve(stored_path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// A URL the read path (service worker or direct file access) can serve.
    pub fn get_file_url(&self, stored_path: &str) -> String {
        format!("/{stored_path}")
    }

    /// Enumerate every stored path under a store's subtree (used by GC sweeps).
    pub async fn list_under_store_root(&self, store_id: &str) -> Result<Vec<String>> {
        let store_dir = self.base_dir.join(FILES_ROOT).join(sanitize_store_id(store_id));
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&store_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(hash) = entry.file_name().to_str() {
                    out.push(stored_path(store_id, hash));
                }
            }
        }
        Ok(out)
    }
}
