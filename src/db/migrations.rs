use rusqlite::Connection;

use crate::error::{FileSyncError, Result};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// Run database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| FileSyncError::Storage(format!("Failed to get schema version: {}", e)))?;

    log::info!(
        "Database schema version: {}, target: {}",
        current_version,
        SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| FileSyncError::Storage(format!("Failed to update schema version: {}", e)))?;

    Ok(())
}

/// Migration v1: local file state and operation history schema
fn migrate_v1(conn: &Connection) -> Result<()> {
    log::info!("Running migration v1: local file state and operation history schema");

    conn.execute_batch(
        r#"
        -- Per-fileId client-local transfer state (spec §3 LocalFileState).
        -- Not replicated; scoped to this client/session only.
        CREATE TABLE IF NOT EXISTS local_file_state (
            file_id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            local_hash TEXT NOT NULL DEFAULT '',
            upload_status TEXT NOT NULL DEFAULT 'idle',
            download_status TEXT NOT NULL DEFAULT 'idle',
            last_sync_error TEXT NOT NULL DEFAULT '',
            updated_at INTEGER NOT NULL
        );

        -- Operation history: every saveFile/updateFile/deleteFile call the
        -- façade makes, for observability.
        CREATE TABLE IF NOT EXISTS operations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),

            file_id TEXT NOT NULL,
            operation TEXT NOT NULL,

            size INTEGER,
            duration_ms INTEGER,

            status TEXT NOT NULL DEFAULT 'pending',
            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_ops_timestamp ON operations(timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_ops_file ON operations(file_id);
        CREATE INDEX IF NOT EXISTS idx_ops_status ON operations(status)
            WHERE status IN ('pending', 'in_progress');
        "#,
    )
    .map_err(|e| FileSyncError::Storage(format!("Failed to run migration v1: {}", e)))?;

    log::info!("Migration v1 completed successfully");
    Ok(())
}
