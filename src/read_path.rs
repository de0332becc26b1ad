//! ServiceWorker read path (spec §4.6): intercepts requests under the
//! `livestore-filesync-files/` prefix and resolves them from local bytes,
//! falling back to the remote adapter with optional write-through caching.
//!
//! Rust has no literal service-worker API, so this is expressed the way
//! DESIGN NOTES §9 asks for platform shells: a portable `resolve()` function
//! that a host's HTTP layer (or an actual service worker shim, in a
//! browser/WASM build) calls into.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::local_storage::{remote_key_for, LocalFileStorage, FILES_ROOT};
use crate::metadata::FileRow;
use crate::remote::{DownloadOpts, RemoteStorage};

/// Header set on every successful response, naming which tier served it.
pub const SOURCE_HEADER: &str = "X-Source";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Opfs,
    Remote,
}

impl ResponseSource {
    fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Opfs => "opfs",
            ResponseSource::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub source: Option<ResponseSource>,
}

impl ReadResponse {
    /// `file` is the `File` row the caller already resolved `stored_path` to
    /// (if it has one), carrying `mime_type`/`size` (SPEC_FULL §3) so the
    /// response doesn't need to re-derive `Content-Type` by guessing from an
    /// extensionless content hash.
    fn hit(body: Vec<u8>, source: ResponseSource, stored_path: &str, file: Option<&FileRow>) -> Self {
        let content_type = file
            .and_then(|f| f.mime_type.clone())
            .or_else(|| mime_guess::from_path(stored_path).first().map(|m| m.to_string()));
        let content_length = file.map(|f| f.size).unwrap_or(body.len() as u64);
        Self {
            status: 200,
            content_type,
            content_length: Some(content_length),
            body,
            source: Some(source),
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            body: Vec::new(),
            content_type: None,
            content_length: None,
            source: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Headers to send alongside `body`: `Content-Type`/`Content-Length` when
    /// known, and `X-Source` on every successful response (spec §4.6 steps 2
    /// and 5).
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(ct) = &self.content_type {
            headers.push(("Content-Type", ct.clone()));
        }
        if let Some(len) = self.content_length {
            headers.push(("Content-Length", len.to_string()));
        }
        if let Some(source) = self.source {
            headers.push((SOURCE_HEADER, source.as_str().to_string()));
        }
        headers
    }
}

#[derive(Debug, Clone)]
pub struct ReadPathConfig {
    /// Requests whose pathname doesn't start with this are not ours to serve.
    pub prefix: String,
    /// Whether a successful remote fetch is written into the local pool.
    pub cache_remote_responses: bool,
}

impl Default for ReadPathConfig {
    fn default() -> Self {
        Self {
            prefix: format!("/{FILES_ROOT}/"),
            cache_remote_responses: true,
        }
    }
}

type RemoteFetch = std::result::Result<Vec<u8>, String>;

/// Resolves stored-path requests against local bytes, then the remote
/// adapter. Coalesces concurrent requests for the same stored-path so a
/// second caller attaches to the first fetch instead of double-fetching
/// remotely (spec §4.6 concurrency requirement).
pub struct ReadPath {
    local: Arc<LocalFileStorage>,
    remote: Option<Arc<RemoteStorage>>,
    config: ReadPathConfig,
    inflight: Mutex<HashMap<String, Arc<OnceCell<RemoteFetch>>>>,
}

impl ReadPath {
    pub fn new(local: Arc<LocalFileStorage>, remote: Option<Arc<RemoteStorage>>, config: ReadPathConfig) -> Self {
        Self {
            local,
            remote,
            config,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve one request pathname, e.g. `/livestore-filesync-files/acct/h1`.
    /// `file` is the `File` row the caller's metadata lookup already found for
    /// this path, if any; its `mime_type`/`size` populate `Content-Type`/
    /// `Content-Length` on a hit (spec §4.6 step 2, SPEC_FULL §3).
    pub async fn resolve(&self, request_path: &str, file: Option<&FileRow>) -> ReadResponse {
        let Some(stored_path) = self.strip_prefix(request_path) else {
            return ReadResponse::not_found();
        };

        if let Ok(bytes) = self.local.read(&stored_path).await {
            return ReadResponse::hit(bytes, ResponseSource::Opfs, &stored_path, file);
        }

        self.resolve_remote(&stored_path, file).await
    }

    fn strip_prefix(&self, request_path: &str) -> Option<String> {
        let full = request_path.trim_start_matches('/');
        let prefix = self.config.prefix.trim_start_matches('/');
        if full.starts_with(prefix) || format!("{full}/").starts_with(prefix) {
            Some(full.to_string())
        } else {
            None
        }
    }

    async fn resolve_remote(&self, stored_path: &str, file: Option<&FileRow>) -> ReadResponse {
        let Some(remote) = &self.remote else {
            return ReadResponse::not_found();
        };
        let Some(key) = remote_key_for(stored_path) else {
            return ReadResponse::not_found();
        };

        let cell = {
            let mut inflight = self.inflight.lock().unwrap();
            Arc::clone(
                inflight
                    .entry(stored_path.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let result = cell
            .get_or_init(|| async {
                let cancel = CancellationToken::new();
                match remote.download(key, DownloadOpts::default(), &cancel).await {
                    Ok(bytes) => {
                        if self.config.cache_remote_responses {
                            if let Err(e) = self.local.write(stored_path, &bytes).await {
                                log::warn!("failed to cache remote response for {stored_path}: {e}");
                            }
                        }
                        Ok(bytes)
                    }
                    Err(e) => Err(e.to_string()),
                }
            })
            .await
            .clone();

        // Drop the coalescing slot once the shared fetch resolves; a later,
        // unrelated request for the same path gets a fresh fetch rather than
        // this result staying cached in memory forever.
        self.inflight.lock().unwrap().remove(stored_path);

        match result {
            Ok(bytes) => ReadResponse::hit(bytes, ResponseSource::Remote, stored_path, file),
            Err(_) => ReadResponse::not_found(),
        }
    }
}
