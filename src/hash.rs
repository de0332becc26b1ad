//! Content hashing. SHA-256 over files and in-memory buffers, dispatched to a
//! blocking thread so hashing large files never stalls the executor's event loop.

use sha2::{Digest, Sha256};

use crate::error::{FileSyncError, Result};

/// Hex-lowercase SHA-256 of a byte buffer.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex-lowercase SHA-256 of an owned byte buffer, off the current task.
pub async fn hash_bytes_async(bytes: Vec<u8>) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_bytes(&bytes))
        .await
        .map_err(|e| FileSyncError::Hash(e.to_string()))
}

/// Hex-lowercase SHA-256 of a file's contents, streamed in chunks so memory
/// use doesn't scale with file size.
pub async fn hash_file(path: &std::path::Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String> {
        use std::io::Read;
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).map_err(FileSyncError::from)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| FileSyncError::Hash(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            hash_bytes(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn zero_byte_is_well_defined() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hash_bytes(b"").len(), 64);
    }

    #[tokio::test]
    async fn hash_file_matches_hash_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"some content").unwrap();
        let expected = hash_bytes(b"some content");
        let actual = hash_file(&path).await.unwrap();
        assert_eq!(actual, expected);
    }
}
