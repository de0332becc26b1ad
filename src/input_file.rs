//! The "file-like" capability the engine accepts from callers: either bytes
//! already resident in memory, or a path to bytes already on disk. Mirrors
//! the `{name, type, size, bytes()}` shape used throughout the source system
//! without committing to a platform-specific file type.

use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone)]
pub enum InputFile {
    Memory {
        name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
    Path {
        name: String,
        content_type: Option<String>,
        path: PathBuf,
    },
}

impl InputFile {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name).first().map(|m| m.to_string());
        InputFile::Memory {
            name,
            content_type,
            bytes,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let content_type = mime_guess::from_path(&path).first().map(|m| m.to_string());
        InputFile::Path {
            name,
            content_type,
            path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            InputFile::Memory { name, .. } => name,
            InputFile::Path { name, .. } => name,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match self {
            InputFile::Memory { content_type, .. } => content_type.as_deref(),
            InputFile::Path { content_type, .. } => content_type.as_deref(),
        }
    }

    /// Materialize the file's bytes, reading from disk for path-backed files.
    pub async fn bytes(&self) -> Result<Vec<u8>> {
        match self {
            InputFile::Memory { bytes, .. } => Ok(bytes.clone()),
            InputFile::Path { path, .. } => Ok(tokio::fs::read(path).await?),
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            InputFile::Memory { bytes, .. } => Some(bytes.len() as u64),
            InputFile::Path { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_roundtrip() {
        let f = InputFile::from_bytes("hello.txt", b"hi".to_vec());
        assert_eq!(f.name(), "hello.txt");
        assert_eq!(f.bytes().await.unwrap(), b"hi");
        assert_eq!(f.content_type(), Some("text/plain"));
    }

    #[tokio::test]
    async fn path_backed_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"xyz").unwrap();
        let f = InputFile::from_path(&path);
        assert_eq!(f.bytes().await.unwrap(), b"xyz");
    }
}
