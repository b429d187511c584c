//! HTTP client wrapper that paces every request through the rate limiter.
//!
//! This module provides the [`PoliteFetcher`] struct which issues GET, HEAD
//! and download-to-temporary-file requests with a configured User-Agent and
//! an optional Referer. Status codes are returned to the caller untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, REFERER, USER_AGENT};
use reqwest::{Client, Method};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_PER_HOST_CONNECTIONS, READ_TIMEOUT_SECS, TEMP_FILE_PREFIX,
};
use super::error::FetchError;
use super::rate_limiter::{RateLimiter, extract_host};
use crate::user_agent;

/// Options for building a [`PoliteFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// User-Agent sent with every request.
    pub user_agent: String,
    /// Maximum simultaneously open requests to one host (at least 1).
    pub per_host_connections: usize,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub read_timeout_secs: u64,
    /// Directory for temporary download files (`None` = system temp dir).
    pub temp_dir: Option<PathBuf>,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            user_agent: user_agent::default_user_agent(),
            per_host_connections: DEFAULT_PER_HOST_CONNECTIONS,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            temp_dir: None,
        }
    }
}

/// Response to a GET request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Full response body.
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Converts a non-2xx response into [`FetchError::BadStatus`].
    ///
    /// # Errors
    ///
    /// Returns `BadStatus` when the status is outside `200..=299`.
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        check_status(&self.url, self.status)?;
        Ok(self)
    }

    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Response to a HEAD request.
#[derive(Debug, Clone)]
pub struct FetchHead {
    /// Final URL after redirects.
    pub url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
}

impl FetchHead {
    /// Converts a non-2xx response into [`FetchError::BadStatus`].
    ///
    /// # Errors
    ///
    /// Returns `BadStatus` when the status is outside `200..=299`.
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        check_status(&self.url, self.status)?;
        Ok(self)
    }
}

/// A response body written to a temporary file.
///
/// The file is not deleted on drop; the caller moves or removes it.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// Location of the downloaded bytes.
    pub path: PathBuf,
    /// Final URL after redirects.
    pub url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Number of bytes written.
    pub bytes: u64,
}

/// HTTP client that consults the rate limiter before every request.
///
/// Created once per process and shared (it is cheap to clone); connection
/// pooling lives in the inner `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct PoliteFetcher {
    client: Client,
    user_agent: String,
    rate_limiter: Arc<RateLimiter>,
    per_host_connections: usize,
    host_permits: Arc<DashMap<String, Arc<Semaphore>>>,
    temp_dir: Option<PathBuf>,
    interrupted: Arc<AtomicBool>,
}

impl PoliteFetcher {
    /// Creates a fetcher sharing the given rate limiter.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the HTTP client cannot be built.
    #[instrument(level = "debug", skip_all, fields(per_host = options.per_host_connections))]
    pub fn new(options: FetcherOptions, rate_limiter: Arc<RateLimiter>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(options.connect_timeout_secs))
            .timeout(Duration::from_secs(options.read_timeout_secs))
            .gzip(true)
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(|e| FetchError::network("client-builder", e))?;

        Ok(Self {
            client,
            user_agent: options.user_agent,
            rate_limiter,
            per_host_connections: options.per_host_connections.max(1),
            host_permits: Arc::new(DashMap::new()),
            temp_dir: options.temp_dir,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns the User-Agent sent with every request.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Returns the shared rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Returns the interrupt flag shared by all clones of this fetcher.
    ///
    /// Setting it makes in-progress and future requests fail with
    /// [`FetchError::Cancelled`] at their next checkpoint.
    #[must_use]
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Fetches `url` and buffers the whole body.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl`, `Network` or `Cancelled`. Non-2xx statuses are
    /// not errors here; see [`FetchResponse::error_for_status`].
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str, referer: Option<&str>) -> Result<FetchResponse, FetchError> {
        let (response, _permit) = self.send(Method::GET, url, referer).await?;
        let final_url = response.url().clone();
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::network(url, e))?
            .to_vec();
        self.checkpoint(url)?;

        debug!(status, bytes = body.len(), "GET complete");
        Ok(FetchResponse {
            url: final_url,
            status,
            headers,
            body,
        })
    }

    /// Sends a HEAD request for `url`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl`, `Network` or `Cancelled`.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn head(&self, url: &str, referer: Option<&str>) -> Result<FetchHead, FetchError> {
        let (response, _permit) = self.send(Method::HEAD, url, referer).await?;
        let head = FetchHead {
            url: response.url().clone(),
            status: response.status().as_u16(),
            headers: response.headers().clone(),
        };
        debug!(status = head.status, "HEAD complete");
        Ok(head)
    }

    /// Streams the body of `url` into a new temporary file.
    ///
    /// On any failure after the file is created, the partial file is removed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl`, `Network`, `Cancelled` or `Io`.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download_to_temporary_location(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<DownloadedFile, FetchError> {
        let (response, _permit) = self.send(Method::GET, url, referer).await?;
        let final_url = response.url().clone();
        let status = response.status().as_u16();
        let headers = response.headers().clone();

        let path = self.create_temp_file()?;
        let written = stream_to_file(self, response, url, &path).await;
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %path.display(), "cleaning up partial download");
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
        };

        info!(path = %path.display(), bytes, status, "download complete");
        Ok(DownloadedFile {
            path,
            url: final_url,
            status,
            headers,
            bytes,
        })
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        referer: Option<&str>,
    ) -> Result<(reqwest::Response, OwnedSemaphorePermit), FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        if parsed.host_str().is_none() {
            return Err(FetchError::invalid_url(url));
        }

        // Spacing slot is reserved while holding the host permit.
        self.checkpoint(url)?;
        let permit = self.host_permit(url).await?;
        self.checkpoint(url)?;
        self.rate_limiter.acquire(url).await;
        self.checkpoint(url)?;

        let mut request = self
            .client
            .request(method, parsed)
            .header(USER_AGENT, &self.user_agent);
        if let Some(referer) = referer.filter(|r| !r.is_empty()) {
            request = request.header(REFERER, referer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;
        Ok((response, permit))
    }

    async fn host_permit(&self, url: &str) -> Result<OwnedSemaphorePermit, FetchError> {
        // Clone the Arc so the DashMap shard lock is released before awaiting.
        let semaphore = self
            .host_permits
            .entry(extract_host(url))
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_connections)))
            .clone();
        semaphore
            .acquire_owned()
            .await
            .map_err(|_| FetchError::cancelled(url))
    }

    fn checkpoint(&self, url: &str) -> Result<(), FetchError> {
        if self.interrupted.load(Ordering::SeqCst) {
            debug!(url = %url, "request interrupted");
            return Err(FetchError::cancelled(url));
        }
        Ok(())
    }

    fn create_temp_file(&self) -> Result<PathBuf, FetchError> {
        let dir = self.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
        let temp = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempfile_in(&dir)
            .map_err(|e| FetchError::io(dir.clone(), e))?;
        let (_file, path) = temp
            .keep()
            .map_err(|e| FetchError::io(dir, e.error))?;
        Ok(path)
    }
}

/// Streams a response body to `path`, returning bytes written.
async fn stream_to_file(
    fetcher: &PoliteFetcher,
    response: reqwest::Response,
    url: &str,
    path: &Path,
) -> Result<u64, FetchError> {
    let file = tokio::fs::File::create(path)
        .await
        .map_err(|e| FetchError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        fetcher.checkpoint(url)?;
        let chunk = chunk_result.map_err(|e| FetchError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| FetchError::io(path, e))?;
    Ok(bytes_written)
}

fn check_status(url: &Url, status: u16) -> Result<(), FetchError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(FetchError::bad_status(url.as_str(), status))
    }
}
