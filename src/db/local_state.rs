//! Persistence for `local_file_state`: the client-local, non-replicated
//! per-fileId transfer bookkeeping (spec §3 `LocalFileState`). Never synced —
//! every client derives and stores its own copy.

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::DbManager;
use crate::error::{FileSyncError, Result};

/// Upload/download transfer status, independent per direction (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferStatus {
    Idle,
    Pending,
    Queued,
    InProgress,
    Done,
    Error,
}

impl TransferStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Idle => "idle",
            TransferStatus::Pending => "pending",
            TransferStatus::Queued => "queued",
            TransferStatus::InProgress => "in_progress",
            TransferStatus::Done => "done",
            TransferStatus::Error => "error",
        }
    }
}

impl TryFrom<&str> for TransferStatus {
    type Error = FileSyncError;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "idle" => Ok(TransferStatus::Idle),
            "pending" => Ok(TransferStatus::Pending),
            "queued" => Ok(TransferStatus::Queued),
            "in_progress" => Ok(TransferStatus::InProgress),
            "done" => Ok(TransferStatus::Done),
            "error" => Ok(TransferStatus::Error),
            _ => Err(FileSyncError::InvalidInput(format!(
                "unknown transfer status: {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFileState {
    pub file_id: String,
    pub path: String,
    pub local_hash: String,
    pub upload_status: TransferStatus,
    pub download_status: TransferStatus,
    pub last_sync_error: String,
    pub updated_at: i64,
}

impl LocalFileState {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let upload: String = row.get("upload_status")?;
        let download: String = row.get("download_status")?;
        Ok(Self {
            file_id: row.get("file_id")?,
            path: row.get("path")?,
            local_hash: row.get("local_hash")?,
            upload_status: TransferStatus::try_from(upload.as_str()).unwrap_or(TransferStatus::Idle),
            download_status: TransferStatus::try_from(download.as_str()).unwrap_or(TransferStatus::Idle),
            last_sync_error: row.get("last_sync_error")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl DbManager {
    /// Insert or fully replace the row for `file_id`.
    pub fn upsert_local_file_state(&self, state: &LocalFileState) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO local_file_state
                (file_id, path, local_hash, upload_status, download_status, last_sync_error, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(file_id) DO UPDATE SET
                path = excluded.path,
                local_hash = excluded.local_hash,
                upload_status = excluded.upload_status,
                download_status = excluded.download_status,
                last_sync_error = excluded.last_sync_error,
                updated_at = excluded.updated_at
            "#,
            params![
                state.file_id,
                state.path,
                state.local_hash,
                state.upload_status.as_str(),
                state.download_status.as_str(),
                state.last_sync_error,
                state.updated_at,
            ],
        )
        .map_err(|e| FileSyncError::Storage(format!("Failed to upsert local file state: {e}")))?;
        Ok(())
    }

    pub fn get_local_file_state(&self, file_id: &str) -> Result<Option<LocalFileState>> {
        let conn = self.get_conn()?;
        conn.query_row(
            r#"
            SELECT file_id, path, local_hash, upload_status, download_status, last_sync_error, updated_at
            FROM local_file_state WHERE file_id = ?1
            "#,
            params![file_id],
            LocalFileState::from_row,
        )
        .optional()
        .map_err(|e| FileSyncError::Storage(format!("Failed to get local file state: {e}")))
    }

    pub fn list_local_file_state(&self) -> Result<Vec<LocalFileState>> {
        let conn = self.get_conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT file_id, path, local_hash, upload_status, download_status, last_sync_error, updated_at
                FROM local_file_state
                "#,
            )
            .map_err(|e| FileSyncError::Storage(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], LocalFileState::from_row)
            .map_err(|e| FileSyncError::Storage(format!("Failed to list local file state: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Update just the upload status and error (used by the executor after each attempt).
    pub fn set_upload_status(
        &self,
        file_id: &str,
        status: TransferStatus,
        error: Option<&str>,
        updated_at: i64,
    ) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE local_file_state SET upload_status = ?1, last_sync_error = ?2, updated_at = ?3 WHERE file_id = ?4",
            params![status.as_str(), error.unwrap_or(""), updated_at, file_id],
        )
        .map_err(|e| FileSyncError::Storage(format!("Failed to update upload status: {e}")))?;
        Ok(())
    }

    /// Update just the download status and error (used by the executor after each attempt).
    pub fn set_download_status(
        &self,
        file_id: &str,
        status: TransferStatus,
        error: Option<&str>,
        updated_at: i64,
    ) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE local_file_state SET download_status = ?1, last_sync_error = ?2, updated_at = ?3 WHERE file_id = ?4",
            params![status.as_str(), error.unwrap_or(""), updated_at, file_id],
        )
        .map_err(|e| FileSyncError::Storage(format!("Failed to update download status: {e}")))?;
        Ok(())
    }

    pub fn delete_local_file_state(&self, file_id: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM local_file_state WHERE file_id = ?1", params![file_id])
            .map_err(|e| FileSyncError::Storage(format!("Failed to delete local file state: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> DbManager {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.into_path().join("state.db");
        DbManager::open(&path).unwrap()
    }

    fn sample(file_id: &str) -> LocalFileState {
        LocalFileState {
            file_id: file_id.to_string(),
            path: "/docs/a.txt".to_string(),
            local_hash: "deadbeef".to_string(),
            upload_status: TransferStatus::Idle,
            download_status: TransferStatus::Idle,
            last_sync_error: String::new(),
            updated_at: 1000,
        }
    }

    #[test]
    fn upsert_then_get_roundtrips() {
        let db = db();
        db.upsert_local_file_state(&sample("f1")).unwrap();
        let got = db.get_local_file_state("f1").unwrap().unwrap();
        assert_eq!(got.local_hash, "deadbeef");
        assert_eq!(got.upload_status, TransferStatus::Idle);
    }

    #[test]
    fn upsert_is_idempotent_update() {
        let db = db();
        db.upsert_local_file_state(&sample("f1")).unwrap();
        let mut updated = sample("f1");
        updated.upload_status = TransferStatus::Done;
        updated.updated_at = 2000;
        db.upsert_local_file_state(&updated).unwrap();

        let rows = db.list_local_file_state().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].upload_status, TransferStatus::Done);
        assert_eq!(rows[0].updated_at, 2000);
    }

    #[test]
    fn set_upload_status_updates_error_message() {
        let db = db();
        db.upsert_local_file_state(&sample("f1")).unwrap();
        db.set_upload_status("f1", TransferStatus::Error, Some("boom"), 3000)
            .unwrap();
        let got = db.get_local_file_state("f1").unwrap().unwrap();
        assert_eq!(got.upload_status, TransferStatus::Error);
        assert_eq!(got.last_sync_error, "boom");
    }

    #[test]
    fn delete_removes_row() {
        let db = db();
        db.upsert_local_file_state(&sample("f1")).unwrap();
        db.delete_local_file_state("f1").unwrap();
        assert!(db.get_local_file_state("f1").unwrap().is_none());
    }
}
