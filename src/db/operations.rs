use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::DbManager;
use crate::error::{FileSyncError, Result};

/// What kind of thing happened, logged for observability (spec §4.5 ambient
/// operations log; not part of the replicated `File` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    SaveFile,
    UpdateFile,
    DeleteFile,
    Upload,
    Download,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::SaveFile => write!(f, "save_file"),
            OperationType::UpdateFile => write!(f, "update_file"),
            OperationType::DeleteFile => write!(f, "delete_file"),
            OperationType::Upload => write!(f, "upload"),
            OperationType::Download => write!(f, "download"),
        }
    }
}

impl TryFrom<&str> for OperationType {
    type Error = FileSyncError;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "save_file" => Ok(OperationType::SaveFile),
            "update_file" => Ok(OperationType::UpdateFile),
            "delete_file" => Ok(OperationType::DeleteFile),
            "upload" => Ok(OperationType::Upload),
            "download" => Ok(OperationType::Download),
            _ => Err(FileSyncError::InvalidInput(format!(
                "Unknown operation type: {}",
                value
            ))),
        }
    }
}

/// Operation status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::InProgress => write!(f, "in_progress"),
            OperationStatus::Completed => write!(f, "completed"),
            OperationStatus::Failed => write!(f, "failed"),
            OperationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl TryFrom<&str> for OperationStatus {
    type Error = FileSyncError;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(OperationStatus::Pending),
            "in_progress" => Ok(OperationStatus::InProgress),
            "completed" => Ok(OperationStatus::Completed),
            "failed" => Ok(OperationStatus::Failed),
            "cancelled" => Ok(OperationStatus::Cancelled),
            _ => Err(FileSyncError::InvalidInput(format!(
                "Unknown operation status: {}",
                value
            ))),
        }
    }
}

/// A row from the `operations` log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: i64,
    pub timestamp: i64,
    pub file_id: String,
    pub operation: OperationType,
    pub size: Option<i64>,
    pub duration_ms: Option<i64>,
    pub status: OperationStatus,
    pub error_message: Option<String>,
}

impl Operation {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let operation_str: String = row.get("operation")?;
        let status_str: String = row.get("status")?;

        Ok(Operation {
            id: row.get("id")?,
            timestamp: row.get("timestamp")?,
            file_id: row.get("file_id")?,
            operation: OperationType::try_from(operation_str.as_str())
                .unwrap_or(OperationType::Upload),
            size: row.get("size")?,
            duration_ms: row.get("duration_ms")?,
            status: OperationStatus::try_from(status_str.as_str())
                .unwrap_or(OperationStatus::Pending),
            error_message: row.get("error_message")?,
        })
    }
}

/// New operation to insert
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub file_id: String,
    pub operation: OperationType,
    pub size: Option<i64>,
    pub status: OperationStatus,
}

/// Filter for querying operations
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFilter {
    pub file_id: Option<String>,
    pub operation: Option<OperationType>,
    pub status: Option<OperationStatus>,
    pub from_timestamp: Option<i64>,
    pub to_timestamp: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl DbManager {
    /// Log a new operation, returning its id.
    pub fn log_operation(&self, op: &NewOperation) -> Result<i64> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO operations (file_id, operation, size, status)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![op.file_id, op.operation.to_string(), op.size, op.status.to_string()],
        )
        .map_err(|e| FileSyncError::Storage(format!("Failed to log operation: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Log a terminal operation with a known duration in one shot.
    pub fn log_completed_operation(
        &self,
        file_id: &str,
        operation: OperationType,
        size: Option<i64>,
        duration_ms: i64,
        error: Option<&str>,
    ) -> Result<i64> {
        let conn = self.get_conn()?;
        let status = if error.is_some() {
            OperationStatus::Failed
        } else {
            OperationStatus::Completed
        };

        conn.execute(
            r#"
            INSERT INTO operations (file_id, operation, size, duration_ms, status, error_message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                file_id,
                operation.to_string(),
                size,
                duration_ms,
                status.to_string(),
                error,
            ],
        )
        .map_err(|e| FileSyncError::Storage(format!("Failed to log operation: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Update operation status (used to transition pending -> in_progress -> terminal).
    pub fn update_operation_status(
        &self,
        id: i64,
        status: OperationStatus,
        duration_ms: Option<i64>,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "UPDATE operations SET status = ?1, duration_ms = ?2, error_message = ?3 WHERE id = ?4",
            params![status.to_string(), duration_ms, error, id],
        )
        .map_err(|e| FileSyncError::Storage(format!("Failed to update operation status: {}", e)))?;

        Ok(())
    }

    /// Query operations with filters, newest first.
    pub fn query_operations(&self, filter: &OperationFilter) -> Result<Vec<Operation>> {
        let conn = self.get_conn()?;

        let mut sql = String::from(
            r#"
            SELECT id, timestamp, file_id, operation, size, duration_ms, status, error_message
            FROM operations
            WHERE 1=1
            "#,
        );
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(file_id) = &filter.file_id {
            sql.push_str(" AND file_id = ?");
            bound.push(Box::new(file_id.clone()));
        }
        if let Some(operation) = &filter.operation {
            sql.push_str(" AND operation = ?");
            bound.push(Box::new(operation.to_string()));
        }
        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            bound.push(Box::new(status.to_string()));
        }
        if let Some(from_ts) = filter.from_timestamp {
            sql.push_str(" AND timestamp >= ?");
            bound.push(Box::new(from_ts));
        }
        if let Some(to_ts) = filter.to_timestamp {
            sql.push_str(" AND timestamp <= ?");
            bound.push(Box::new(to_ts));
        }

        sql.push_str(" ORDER BY timestamp DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        } else {
            sql.push_str(" LIMIT 100");
        }
        if let Some(offset) = filter.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| FileSyncError::Storage(format!("Failed to prepare query: {}", e)))?;

        let params_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|p| p.as_ref()).collect();

        let operations = stmt
            .query_map(params_refs.as_slice(), Operation::from_row)
            .map_err(|e| FileSyncError::Storage(format!("Failed to query operations: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(operations)
    }

    /// Export operations matching `filter` as pretty-printed JSON, the way
    /// the teacher's `export_operations` command offers a JSON export format
    /// alongside CSV. This crate has no CSV consumer of its own (no frontend
    /// table to export from), so only the JSON form is carried over.
    pub fn export_operations_json(&self, filter: &OperationFilter) -> Result<String> {
        let mut export_filter = filter.clone();
        export_filter.limit = export_filter.limit.or(Some(10_000));
        export_filter.offset = None;

        let operations = self.query_operations(&export_filter)?;
        serde_json::to_string_pretty(&operations)
            .map_err(|e| FileSyncError::Storage(format!("Failed to serialize operations: {e}")))
    }

    /// Cleanup operations older than `days` days, returning the count removed.
    pub fn cleanup_old_operations(&self, days: i64) -> Result<usize> {
        let conn = self.get_conn()?;
        let cutoff = chrono::Utc::now().timestamp() - (days * 86400);

        let deleted = conn
            .execute("DELETE FROM operations WHERE timestamp < ?1", params![cutoff])
            .map_err(|e| FileSyncError::Storage(format!("Failed to cleanup operations: {}", e)))?;

        log::info!("Cleaned up {} old operations (older than {} days)", deleted, days);
        Ok(deleted)
    }

    /// Get a single operation by id.
    pub fn get_operation(&self, id: i64) -> Result<Option<Operation>> {
        let conn = self.get_conn()?;

        let result = conn.query_row(
            r#"
            SELECT id, timestamp, file_id, operation, size, duration_ms, status, error_message
            FROM operations
            WHERE id = ?1
            "#,
            params![id],
            Operation::from_row,
        );

        match result {
            Ok(op) => Ok(Some(op)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(FileSyncError::Storage(format!("Failed to get operation: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> DbManager {
        let dir = tempfile::tempdir().unwrap();
        // leak the tempdir so the file outlives this function; tests are short-lived processes
        let path = dir.into_path().join("state.db");
        DbManager::open(&path).unwrap()
    }

    #[test]
    fn log_then_query_roundtrips() {
        let db = db();
        let id = db
            .log_operation(&NewOperation {
                file_id: "f1".into(),
                operation: OperationType::Upload,
                size: Some(42),
                status: OperationStatus::Pending,
            })
            .unwrap();

        db.update_operation_status(id, OperationStatus::Completed, Some(120), None)
            .unwrap();

        let found = db.get_operation(id).unwrap().unwrap();
        assert_eq!(found.file_id, "f1");
        assert_eq!(found.status, OperationStatus::Completed);
        assert_eq!(found.duration_ms, Some(120));
    }

    #[test]
    fn query_filters_by_file_id() {
        let db = db();
        db.log_operation(&NewOperation {
            file_id: "f1".into(),
            operation: OperationType::SaveFile,
            size: None,
            status: OperationStatus::Completed,
        })
        .unwrap();
        db.log_operation(&NewOperation {
            file_id: "f2".into(),
            operation: OperationType::SaveFile,
            size: None,
            status: OperationStatus::Completed,
        })
        .unwrap();

        let rows = db
            .query_operations(&OperationFilter {
                file_id: Some("f1".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_id, "f1");
    }

    #[test]
    fn export_json_contains_logged_operation() {
        let db = db();
        db.log_operation(&NewOperation {
            file_id: "f1".into(),
            operation: OperationType::Upload,
            size: Some(7),
            status: OperationStatus::Completed,
        })
        .unwrap();

        let json = db.export_operations_json(&OperationFilter::default()).unwrap();
        assert!(json.contains("\"fileId\": \"f1\""));
        assert!(json.contains("\"upload\""));
    }
}
