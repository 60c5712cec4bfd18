//! Content fetching: URL → bytes + headers, with retry and memoisation.
//!
//! [`HttpFetcher`] retries connection-level failures only, following an
//! explicit [`RetryPolicy`]. A server that answers with a non-2xx status is
//! never retried. Local paths are accepted too (the CLI passes them through
//! unchanged), in which case the content type is inferred from the extension.
//!
//! [`CachedFetcher`] memoises any [`Fetcher`] by URL in the shared
//! [`PipelineCaches`]. Entries are dropped explicitly through
//! [`CachedFetcher::invalidate`] or by the temp-file guard.

use crate::cache::PipelineCaches;
use crate::error::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bytes and (lower-cased) response headers of one fetched resource.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Arc<Vec<u8>>,
    pub headers: HashMap<String, String>,
}

impl Fetched {
    pub fn new(bytes: Vec<u8>, headers: HashMap<String, String>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            bytes: Arc::new(bytes),
            headers,
        }
    }

    /// Shorthand for a resource with only a `Content-Type` header.
    pub fn with_content_type(bytes: Vec<u8>, content_type: &str) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        Self::new(bytes, headers)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

/// Anything that can turn a URL into bytes.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Fetched>;
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backoff {
    /// Always `base_delay_ms`.
    Fixed,
    /// `base_delay_ms * attempt`.
    Linear,
    /// `base_delay_ms * 2^(attempt-1)`. (default)
    #[default]
    Exponential,
}

/// Retry policy applied at each call site.
///
/// The policy is data; the retryable-error predicate is supplied by the call
/// site to [`RetryPolicy::run`] because only it knows its error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Default: 3.
    pub max_attempts: u32,
    /// Delay before the second attempt. Default: 3000 ms.
    pub base_delay_ms: u64,
    /// Growth of subsequent delays. Default: exponential.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 3000,
            backoff: Backoff::Exponential,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let n = attempt.max(1);
        let ms = match self.backoff {
            Backoff::Fixed => self.base_delay_ms,
            Backoff::Linear => self.base_delay_ms.saturating_mul(n as u64),
            Backoff::Exponential => self
                .base_delay_ms
                .saturating_mul(1u64 << (n - 1).min(16)),
        };
        Duration::from_millis(ms)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are exhausted. On failure returns the last error together
    /// with the number of attempts made.
    pub fn run<T, E: std::fmt::Display>(
        &self,
        mut op: impl FnMut(u32) -> std::result::Result<T, E>,
        is_retryable: impl Fn(&E) -> bool,
    ) -> std::result::Result<T, (E, u32)> {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max && is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, max, e, delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}

// ── HTTP fetcher ─────────────────────────────────────────────────────────

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Blocking HTTP fetcher with connection-level retry.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client, retry })
    }

    fn fetch_remote(&self, url: &str) -> Result<Fetched> {
        info!("Fetching: {}", url);

        let response = self
            .retry
            .run(
                |_| self.client.get(url).send(),
                |e: &reqwest::Error| e.is_connect(),
            )
            .map_err(|(e, attempts)| ExtractError::Fetch {
                url: url.to_string(),
                attempts,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::FetchStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();

        let bytes = response.bytes().map_err(|e| ExtractError::Fetch {
            url: url.to_string(),
            attempts: 1,
            reason: e.to_string(),
        })?;

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(Fetched::new(bytes.to_vec(), headers))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Fetched> {
        if is_url(url) {
            self.fetch_remote(url)
        } else {
            fetch_local(url)
        }
    }
}

/// Read a local file, inferring its content type from the extension.
fn fetch_local(path_str: &str) -> Result<Fetched> {
    let path = Path::new(path_str.strip_prefix("file://").unwrap_or(path_str));
    let bytes = std::fs::read(path).map_err(|e| ExtractError::io(path, e))?;
    debug!("Read local file: {}", path.display());
    Ok(Fetched::with_content_type(
        bytes,
        content_type_for_extension(path),
    ))
}

/// Best-effort content type for a local file.
pub fn content_type_for_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("txt") | Some("md") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("webp") => "image/webp",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

// ── Memoised fetcher ─────────────────────────────────────────────────────

/// Memoises an inner [`Fetcher`] by URL.
pub struct CachedFetcher {
    inner: Arc<dyn Fetcher>,
    caches: Arc<PipelineCaches>,
}

impl CachedFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, caches: Arc<PipelineCaches>) -> Self {
        Self { inner, caches }
    }

    /// Drop the memoised entry for `url`.
    pub fn invalidate(&self, url: &str) {
        self.caches.fetch.invalidate(&url.to_string());
    }
}

impl Fetcher for CachedFetcher {
    fn fetch(&self, url: &str) -> Result<Fetched> {
        self.caches
            .fetch
            .get_or_try_insert(url.to_string(), || self.inner.fetch(url))
    }
}
