//! HTTP client wrapper for validating and fetching archive payloads.
//!
//! # Overview
//!
//! The `Downloader` wraps a pooled `reqwest::Client` and a shared
//! [`RateLimiter`]: every outbound request (HEAD probe or full fetch) passes
//! through the same pacing gate. Payloads are streamed to disk with an
//! incremental SHA-256 and a hard byte cap that aborts mid-stream when the
//! server lies about (or omits) Content-Length.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use harvester_core::download::{Downloader, RateLimiter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = Arc::new(RateLimiter::with_defaults());
//! let downloader = Downloader::new(limiter)?;
//! if downloader.validate("https://example.com/pack.zip").await? {
//!     let outcome = downloader
//!         .fetch("https://example.com/pack.zip", Path::new("./downloads/mods"), Some("pack"))
//!         .await?;
//!     println!("saved {} ({} bytes)", outcome.path.display(), outcome.bytes);
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, MAX_ARCHIVE_BYTES, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::filename::resolve_filename;
use super::rate_limiter::{RateLimiter, parse_retry_after};

/// Outcome of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Final on-disk path of the payload.
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the payload bytes.
    pub sha256_hex: String,
    /// Total bytes written.
    pub bytes: u64,
}

/// HTTP client for validating and fetching archive payloads.
///
/// Created once and shared; connection pooling and pacing state live here.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    limiter: Arc<RateLimiter>,
    max_bytes: u64,
}

impl Downloader {
    /// Creates a downloader with default timeouts and the 500 MB payload cap.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(limiter: Arc<RateLimiter>) -> Result<Self, DownloadError> {
        Self::with_timeouts(limiter, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a downloader with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn with_timeouts(
        limiter: Arc<RateLimiter>,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .build()
            .map_err(|e| DownloadError::network("client construction", e))?;
        Ok(Self {
            client,
            limiter,
            max_bytes: MAX_ARCHIVE_BYTES,
        })
    }

    /// Overrides the payload byte cap. Used by tests with small fixtures.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Returns the shared rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Probes a download URL with a HEAD request before committing to a fetch.
    ///
    /// Returns `Ok(false)` only when the probe positively disqualifies the
    /// URL: a declared Content-Length over the cap, or an HTML content type
    /// (an error page standing in for the archive). Probe failures and
    /// missing headers return `Ok(true)` so a flaky HEAD handler never blocks
    /// a download the GET might still serve.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::InvalidUrl` when the URL does not parse.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn validate(&self, url: &str) -> Result<bool, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        self.limiter.wait().await;
        let response = match self.client.head(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "HEAD probe failed, proceeding permissively");
                return Ok(true);
            }
        };

        if response.status().as_u16() == 429 {
            let retry_after = header_str(&response, RETRY_AFTER.as_str())
                .and_then(|value| parse_retry_after(&value));
            if let Some(delay) = retry_after {
                self.limiter.apply_server_delay(delay).await;
            }
            self.limiter.on_rate_limited().await;
            // Throttled, not disqualified.
            return Ok(true);
        }

        if !response.status().is_success() {
            debug!(status = %response.status(), "HEAD probe returned non-success, proceeding permissively");
            return Ok(true);
        }

        if let Some(length) = header_str(&response, CONTENT_LENGTH.as_str())
            .and_then(|value| value.parse::<u64>().ok())
        {
            if length > self.max_bytes {
                warn!(
                    content_length = length,
                    cap = self.max_bytes,
                    "declared size exceeds cap, rejecting"
                );
                self.limiter.on_success().await;
                return Ok(false);
            }
        }

        if let Some(content_type) = header_str(&response, CONTENT_TYPE.as_str()) {
            if content_type.to_ascii_lowercase().contains("text/html") {
                warn!(content_type = %content_type, "HTML response where archive expected, rejecting");
                self.limiter.on_success().await;
                return Ok(false);
            }
        }

        self.limiter.on_success().await;
        Ok(true)
    }

    /// Fetches a payload to `dest_dir`, streaming with an incremental SHA-256.
    ///
    /// The filename comes from the Content-Disposition header, then the URL
    /// path, then a hashed fallback; with a `name_prefix` the file is saved
    /// as `<prefix>_<filename>`, so one directory can hold the payloads of
    /// many items without collisions. The stream aborts (and the partial
    /// file is removed) if it exceeds the byte cap regardless of what the
    /// server declared.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` when the URL is invalid, the request fails,
    /// the server returns an error status, the payload exceeds the cap, or a
    /// disk write fails.
    #[instrument(skip(self), fields(url = %url, dest = %dest_dir.display()))]
    pub async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        name_prefix: Option<&str>,
    ) -> Result<FetchOutcome, DownloadError> {
        let parsed_url = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        self.limiter.wait().await;
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                self.limiter.on_error().await;
                if e.is_timeout() {
                    return Err(DownloadError::timeout(url));
                }
                return Err(DownloadError::network(url, e));
            }
        };

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_raw = header_str(&response, RETRY_AFTER.as_str());
            if let Some(delay) = retry_after_raw
                .as_deref()
                .and_then(parse_retry_after)
            {
                self.limiter.apply_server_delay(delay).await;
            }
            self.limiter.on_rate_limited().await;
            return Err(DownloadError::http_status_with_retry_after(
                url,
                429,
                retry_after_raw,
            ));
        }
        if !status.is_success() {
            self.limiter.on_error().await;
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let content_disposition = header_str(&response, CONTENT_DISPOSITION.as_str());
        let content_type = header_str(&response, CONTENT_TYPE.as_str());
        let resolved = resolve_filename(
            &parsed_url,
            content_disposition.as_deref(),
            content_type.as_deref(),
        );
        let filename = match name_prefix {
            Some(prefix) => format!("{prefix}_{resolved}"),
            None => resolved,
        };

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| DownloadError::io(dest_dir, e))?;
        let path = dest_dir.join(&filename);

        match self.stream_to_file(url, response, &path).await {
            Ok((bytes, sha256_hex)) => {
                self.limiter.on_success().await;
                info!(bytes, sha256 = %sha256_hex, path = %path.display(), "fetch complete");
                Ok(FetchOutcome {
                    path,
                    sha256_hex,
                    bytes,
                })
            }
            Err(e) => {
                self.limiter.on_error().await;
                // Never leave a partial payload behind.
                let _ = tokio::fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        url: &str,
        response: reqwest::Response,
        path: &Path,
    ) -> Result<(u64, String), DownloadError> {
        let file = File::create(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        let mut hasher = Sha256::new();
        let mut total: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    if e.is_timeout() {
                        return Err(DownloadError::timeout(url));
                    }
                    return Err(DownloadError::network(url, e));
                }
            };

            total += chunk.len() as u64;
            if total > self.max_bytes {
                return Err(DownloadError::oversized(url, total, self.max_bytes));
            }

            hasher.update(&chunk);
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(path, e))?;
        }

        writer.flush().await.map_err(|e| DownloadError::io(path, e))?;
        let digest = hasher.finalize();
        let sha256_hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        Ok((total, sha256_hex))
    }
}

fn header_str(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}
