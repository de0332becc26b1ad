//! Signer-client remote adapter: obtains presigned PUT/GET/DELETE URLs from a
//! configured signer endpoint, then performs the transfer directly against
//! the object store using the returned URL and headers.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{DownloadOpts, Progress, ProgressSink, UploadOpts, UploadOutcome};
use crate::error::{FileSyncError, Result};

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Splits `bytes` into fixed-size chunks and reports a coalesced-by-chunk
/// progress sample as each one is handed to the HTTP body, so upload
/// progress reflects the PUT actually streaming rather than one all-at-once
/// sample (spec §4.4: progress via platform streaming primitives).
fn chunked_progress_stream(
    bytes: Vec<u8>,
    on_progress: Option<ProgressSink>,
    total: u64,
) -> impl futures::Stream<Item = std::result::Result<Vec<u8>, std::io::Error>> {
    let mut loaded = 0u64;
    futures::stream::iter(bytes.chunks(UPLOAD_CHUNK_SIZE).map(|c| c.to_vec()).collect::<Vec<_>>())
        .map(move |chunk| {
            loaded += chunk.len() as u64;
            if let Some(sink) = &on_progress {
                sink(Progress {
                    loaded,
                    total: Some(total),
                });
            }
            Ok(chunk)
        })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerClientConfig {
    /// Base URL of the signer service, e.g. `https://sign.example.com`.
    pub base_url: String,
    /// `Authorization: Bearer <token>` sent on every signer request.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// `X-Worker-Auth` sent on every signer request, as an alternative to bearer auth.
    #[serde(default)]
    pub worker_auth: Option<String>,
}

#[derive(Debug, Serialize)]
struct SignUploadRequest<'a> {
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_length: Option<u64>,
}

#[derive(Debug, Serialize)]
struct SignDownloadRequest<'a> {
    key: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    key: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    expires_at: Option<i64>,
}

impl SignResponse {
    /// The request deadline spec §5 requires: the time remaining until
    /// `expiresAt`, clamped to zero if the signer already considers the URL
    /// expired. `None` when the signer didn't report an expiry.
    fn deadline(&self) -> Option<Duration> {
        let expires_at = self.expires_at?;
        let remaining = expires_at - chrono::Utc::now().timestamp();
        Some(Duration::from_secs(remaining.max(0) as u64))
    }
}

/// Presigned-URL client against an S3-compatible object store, fronted by an
/// application-owned signer service (spec §6's signer HTTP API). Caches one
/// `reqwest::Client` per adapter instance, the way the teacher's
/// `S3ClientManager` caches one SDK client per account.
pub struct SignerClientRemoteStorage {
    http: reqwest::Client,
    config: SignerClientConfig,
}

impl SignerClientRemoteStorage {
    pub fn new(config: SignerClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn auth(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.config.bearer_token {
            req = req.bearer_auth(token);
        }
        if let Some(worker_auth) = &self.config.worker_auth {
            req = req.header("X-Worker-Auth", worker_auth);
        }
        req
    }

    async fn sign(&self, path: &str, body: impl Serialize) -> Result<SignResponse> {
        let url = format!("{}{}", self.config.base_url, path);
        let req = self.auth(self.http.post(&url).json(&body));
        let response = req.send().await?;
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(FileSyncError::Auth(format!("signer returned {status}")));
        }
        if !status.is_success() {
            let retryable = status.is_server_error();
            return Err(FileSyncError::upload(
                format!("signer returned {status}"),
                retryable,
            ));
        }
        Ok(response.json().await?)
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

        let signed = self
            .sign(
                "/v1/sign/upload",
                SignUploadRequest {
                    key,
                    content_type: opts.content_type.as_deref(),
                    content_length: Some(bytes.len() as u64),
                },
            )
            .await?;

        let total = bytes.len() as u64;
        let body = reqwest::Body::wrap_stream(chunked_progress_stream(bytes.to_vec(), opts.on_progress.clone(), total));
        let mut req = self.http.put(&signed.url).body(body);
        for (name, value) in &signed.headers {
            req = req.header(name, value);
        }
        req = req.header("Content-Length", total);
        if let Some(content_type) = &opts.content_type {
            req = req.header("Content-Type", content_type);
        }
        if let Some(deadline) = signed.deadline() {
            req = req.timeout(deadline);
        }

        let response = tokio::select! {
            result = req.send() => result?,
            _ = cancel.cancelled() => return Err(FileSyncError::Cancelled),
        };

        if !response.status().is_success() {
            let status = response.status();
            return Err(FileSyncError::upload(
                format!("object store PUT returned {status}"),
                status.is_server_error() || status.as_u16() == 429,
            ));
        }

        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim_matches('"').to_string());

        Ok(UploadOutcome {
            url: signed.url,
            etag,
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

        let signed = self
            .sign("/v1/sign/download", SignDownloadRequest { key })
            .await?;

        let mut req = self.http.get(&signed.url);
        for (name, value) in &signed.headers {
            req = req.header(name, value);
        }
        if let Some(if_none_match) = &opts.if_none_match {
            req = req.header("If-None-Match", if_none_match);
        }
        if let Some(deadline) = signed.deadline() {
            req = req.timeout(deadline);
        }

        let response = tokio::select! {
            result = req.send() => result?,
            _ = cancel.cancelled() => return Err(FileSyncError::Cancelled),
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FileSyncError::NotFound(key.to_string()));
        }
        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(FileSyncError::download(
                format!("object store GET returned {status}"),
                status.is_server_error(),
            ));
        }

        let total = response.content_length();
        let mut loaded = 0u64;
        let mut bytes = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            loaded += chunk.len() as u64;
            bytes.extend_from_slice(&chunk);
            if let Some(sink) = &opts.on_progress {
                sink(Progress { loaded, total });
            }
        }
        Ok(bytes)
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let url = format!("{}/v1/delete", self.config.base_url);
        let req = self.auth(self.http.post(&url).json(&DeleteRequest { key }));
        let response = req.send().await?;
        // Idempotent: a missing object still yields 204 per the signer contract.
        if response.status().is_success()
            || response.status() == reqwest::StatusCode::NOT_FOUND
        {
            Ok(())
        } else {
            let status = response.status();
            Err(FileSyncError::Storage(format!(
                "signer delete returned {status}"
            )))
        }
    }

    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        match self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
