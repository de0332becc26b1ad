use serde::Serialize;
use thiserror::Error;

/// Tagged error kinds for the file-sync engine.
///
/// Variants carry structured payloads rather than relying on an exception
/// hierarchy, so callers can match on kind instead of parsing messages.
#[derive(Error, Debug)]
pub enum FileSyncError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("upload failed: {cause}")]
    Upload { cause: String, retryable: bool },

    #[error("download failed: {cause}")]
    Download { cause: String, retryable: bool },

    #[error("hash error: {0}")]
    Hash(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cancelled")]
    Cancelled,
}

impl FileSyncError {
    /// Whether the executor should retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            FileSyncError::Upload { retryable, .. } => *retryable,
            FileSyncError::Download { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn upload(cause: impl std::fmt::Display, retryable: bool) -> Self {
        FileSyncError::Upload {
            cause: cause.to_string(),
            retryable,
        }
    }

    pub fn download(cause: impl std::fmt::Display, retryable: bool) -> Self {
        FileSyncError::Download {
            cause: cause.to_string(),
            retryable,
        }
    }
}

impl Serialize for FileSyncError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<rusqlite::Error> for FileSyncError {
    fn from(err: rusqlite::Error) -> Self {
        FileSyncError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for FileSyncError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            FileSyncError::NotFound(err.to_string())
        } else {
            FileSyncError::Storage(err.to_string())
        }
    }
}

impl From<reqwest::Error> for FileSyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return FileSyncError::download(err, true);
        }
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                FileSyncError::Auth(err.to_string())
            }
            Some(status) => {
                let retryable = status.is_server_error() || status.as_u16() == 429;
                FileSyncError::upload(err, retryable)
            }
            None => FileSyncError::Storage(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FileSyncError>;
