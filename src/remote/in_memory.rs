//! In-memory [`RemoteStorage`](super::RemoteStorage) fake for tests: backs
//! the object store with a `HashMap`, with injectable failure modes to drive
//! the retry/backoff scenarios in spec §8.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use super::{DownloadOpts, Progress, UploadOpts, UploadOutcome};
use crate::error::{FileSyncError, Result};
use crate::hash::hash_bytes;

struct Object {
    bytes: Vec<u8>,
    etag: String,
}

/// A scripted failure: fail the next `remaining` attempts for `key` with the
/// given HTTP-like status, then let it through.
struct FailurePlan {
    status: u16,
    remaining: u32,
}

pub struct InMemoryRemoteStorage {
    objects: Mutex<HashMap<String, Object>>,
    upload_failures: Mutex<HashMap<String, FailurePlan>>,
}

impl InMemoryRemoteStorage {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            upload_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Script the next `count` uploads to `key` to fail with `status`.
    pub fn fail_next_uploads(&self, key: &str, status: u16, count: u32) {
        self.upload_failures
            .lock()
            .unwrap()
            .insert(key.to_string(), FailurePlan { status, remaining: count });
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub async fn upload(
        &self,
        bytes: &[u8],
        key: &str,
        opts: UploadOpts,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome> {
        if cancel.is_cancelled() {
            return Err(FileSyncError::Cancelled);
        }

        {
            let mut failures = self.upload_failures.lock().unwrap();
            if let Some(plan) = failures.get_mut(key) {
                if plan.remaining > 0 {
                    plan.remaining -= 1;
                    let status = plan.status;
                    if plan.remaining == 0 {
                        failures.remove(key);
                    }
                    let retryable = status >= 500 || status == 429;
                    return Err(FileSyncError::upload(
                        format!("simulated {status} response"),
                        retryable,
                    ));
                }
            }
        }

        let etag = hash_bytes(bytes);
        self.objects.lock().unwrap().insert(
            key.to_string(),
            Object {
                bytes: bytes.to_vec(),
                etag: etag.clone(),
            },
        );

        if let Some(sink) = opts.on_progress {
            sink(Progress {
                loaded: bytes.len() as u64,
                total: Some(bytes.len() as u64),
            });
        }

        Ok(UploadOutcome {
            url: format!("memory://{key}"),
            etag: Some(etag),
        })
    }

    pub async fn download(
        &self,
        key: &str,
        opts: DownloadOpts,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(FileSyncError::Cancelled);
        }
        let objects = self.objects.lock().unwrap();
        let object = objects
            .get(key)
            .ok_or_else(|| FileSyncError::NotFound(key.to_string()))?;

        if opts.if_none_match.as_deref() == Some(object.etag.as_str()) {
            return Ok(Vec::new());
        }

        if let Some(sink) = opts.on_progress {
            sink(Progress {
                loaded: object.bytes.len() as u64,
                total: Some(object.bytes.len() as u64),
            });
        }

        Ok(object.bytes.clone())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    pub async fn health(&self) -> bool {
        true
    }
}

impl Default for InMemoryRemoteStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_download_roundtrips() {
        let remote = InMemoryRemoteStorage::new();
        let cancel = CancellationToken::new();
        remote
            .upload(b"hello", "test/k1", UploadOpts::default(), &cancel)
            .await
            .unwrap();
        let got = remote
            .download("test/k1", DownloadOpts::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn download_of_absent_key_is_not_found() {
        let remote = InMemoryRemoteStorage::new();
        let cancel = CancellationToken::new();
        let err = remote
            .download("nope", DownloadOpts::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FileSyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn scripted_failures_then_success() {
        let remote = InMemoryRemoteStorage::new();
        let cancel = CancellationToken::new();
        remote.fail_next_uploads("test/k1", 503, 2);

        for _ in 0..2 {
            let err = remote
                .upload(b"x", "test/k1", UploadOpts::default(), &cancel)
                .await
                .unwrap_err();
            assert!(err.is_retryable());
        }
        remote
            .upload(b"x", "test/k1", UploadOpts::default(), &cancel)
            .await
            .unwrap();
        assert!(remote.contains("test/k1"));
    }

    #[tokio::test]
    async fn non_retryable_failure_surfaces_once() {
        let remote = InMemoryRemoteStorage::new();
        let cancel = CancellationToken::new();
        remote.fail_next_uploads("test/k1", 403, 1);
        let err = remote
            .upload(b"x", "test/k1", UploadOpts::default(), &cancel)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
