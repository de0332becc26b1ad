pub mod local_state;
pub mod migrations;
pub mod operations;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::{Path, PathBuf};

use crate::error::{FileSyncError, Result};

/// Database manager with connection pooling, for the client-scoped
/// `local_file_state` and `operations` tables (spec §3 / SPEC_FULL §4.5).
#[derive(Clone)]
pub struct DbManager {
    pool: Pool<SqliteConnectionManager>,
}

impl DbManager {
    /// Open (creating if absent) the database at the platform default location.
    pub fn new() -> Result<Self> {
        Self::open(&default_db_path()?)
    }

    /// Open (creating if absent) the database at an explicit path. Useful for
    /// tests and for hosts that manage their own data directory.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FileSyncError::Storage(format!("Failed to create database directory: {}", e))
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| FileSyncError::Storage(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| FileSyncError::Storage(format!("Failed to get connection: {}", e)))?;

            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )
            .map_err(|e| FileSyncError::Storage(format!("Failed to configure database: {}", e)))?;

            migrations::run_migrations(&conn)?;
        }

        log::info!("Database initialized at {:?}", db_path);

        Ok(Self { pool })
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| FileSyncError::Storage(format!("Failed to get database connection: {}", e)))
    }
}

fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| FileSyncError::Storage("Could not determine data directory".to_string()))?;

    Ok(data_dir.join("filesync").join("state.db"))
}
