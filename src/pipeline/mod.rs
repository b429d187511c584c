//! Page download pipeline: one comic page in, numbered image files out.
//!
//! [`PageDownloader::download_page`] fetches a page, resolves its image URLs,
//! downloads each image through the shared [`PoliteFetcher`] with the page
//! as `Referer`, and moves the results into the output directory as
//! `001.ext`, `002.ext`, ... in reading order. Moving a file into place is a
//! commit and waits on the [`CommitGate`].
//!
//! Individual image failures are counted, not fatal. Nothing is retried.

mod filename;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::context::AppContext;
use crate::extract::extract_image_urls;
use crate::fetch::{DownloadedFile, FetchError, PoliteFetcher};
use crate::gate::CommitGate;

pub use filename::page_file_name;

/// Errors that abort a whole page download.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The page itself could not be fetched, or returned a non-2xx status.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The output directory could not be prepared.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The concurrency limiter was closed while downloads were pending.
    #[error("download limiter closed unexpectedly")]
    LimiterClosed,
}

impl PipelineError {
    /// Returns true when the failure is a cancellation rather than a fault.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Fetch(e) if e.is_cancelled())
    }
}

/// Outcome of one page download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageDownloadReport {
    /// Number of image URLs resolved from the page.
    pub resolved: usize,
    /// Files written, in reading order.
    pub saved: Vec<PathBuf>,
    /// Images that failed to download or save.
    pub failed: usize,
    /// Images skipped because the fetcher was interrupted.
    pub cancelled: usize,
}

/// Result of one image task.
enum ImageOutcome {
    Saved(PathBuf),
    Failed,
    Cancelled,
}

/// Downloads comic pages into numbered image files.
#[derive(Debug, Clone)]
pub struct PageDownloader {
    fetcher: Arc<PoliteFetcher>,
    gate: Arc<CommitGate>,
    max_concurrent: usize,
}

impl PageDownloader {
    /// Creates a downloader running at most `max_concurrent` image downloads at once.
    #[must_use]
    pub fn new(fetcher: Arc<PoliteFetcher>, gate: Arc<CommitGate>, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            gate,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Creates a downloader from the shared collaborators in `context`.
    #[must_use]
    pub fn from_context(context: &AppContext) -> Self {
        Self::new(
            context.fetcher(),
            context.gate(),
            context.config().max_concurrent,
        )
    }

    /// Fetches `page_url` and returns the image URLs `selector` resolves to.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Fetch`] if the page cannot be fetched or
    /// answers with a non-2xx status.
    #[instrument(skip(self))]
    pub async fn resolve_page(
        &self,
        page_url: &str,
        selector: &str,
    ) -> Result<(Url, Vec<Url>), PipelineError> {
        let page = self.fetcher.get(page_url, None).await?.error_for_status()?;
        let urls = extract_image_urls(&page.text(), selector, Some(&page.url));
        debug!(final_url = %page.url, images = urls.len(), "page resolved");
        Ok((page.url, urls))
    }

    /// Downloads every image on `page_url` matched by `selector` into `output_dir`.
    ///
    /// # Errors
    ///
    /// Fails only when the page itself cannot be fetched or the output
    /// directory cannot be created. Per-image failures are reported in the
    /// returned [`PageDownloadReport`].
    #[instrument(skip(self, output_dir), fields(output_dir = %output_dir.display()))]
    pub async fn download_page(
        &self,
        page_url: &str,
        selector: &str,
        output_dir: &Path,
    ) -> Result<PageDownloadReport, PipelineError> {
        let (page_url, image_urls) = self.resolve_page(page_url, selector).await?;

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| PipelineError::Io {
                path: output_dir.to_path_buf(),
                source,
            })?;

        info!(images = image_urls.len(), "downloading page images");
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(image_urls.len());

        for (position, image_url) in image_urls.iter().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| PipelineError::LimiterClosed)?;

            let fetcher = Arc::clone(&self.fetcher);
            let gate = Arc::clone(&self.gate);
            let referer = page_url.to_string();
            let image_url = image_url.clone();
            let output_dir = output_dir.to_path_buf();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                save_image(&fetcher, &gate, position, &image_url, &referer, &output_dir).await
            }));
        }

        let mut report = PageDownloadReport {
            resolved: image_urls.len(),
            ..PageDownloadReport::default()
        };
        for handle in handles {
            match handle.await {
                Ok(ImageOutcome::Saved(path)) => report.saved.push(path),
                Ok(ImageOutcome::Failed) => report.failed += 1,
                Ok(ImageOutcome::Cancelled) => report.cancelled += 1,
                Err(e) => {
                    warn!(error = %e, "image task panicked");
                    report.failed += 1;
                }
            }
        }

        info!(
            saved = report.saved.len(),
            failed = report.failed,
            cancelled = report.cancelled,
            "page download complete"
        );
        Ok(report)
    }
}

async fn save_image(
    fetcher: &PoliteFetcher,
    gate: &CommitGate,
    position: usize,
    image_url: &Url,
    referer: &str,
    output_dir: &Path,
) -> ImageOutcome {
    let downloaded = match fetcher
        .download_to_temporary_location(image_url.as_str(), Some(referer))
        .await
    {
        Ok(file) => file,
        Err(e) if e.is_cancelled() => {
            debug!(url = %image_url, "image download cancelled");
            return ImageOutcome::Cancelled;
        }
        Err(e) => {
            warn!(url = %image_url, error = %e, "image download failed");
            return ImageOutcome::Failed;
        }
    };

    if !(200..=299).contains(&downloaded.status) {
        warn!(url = %image_url, status = downloaded.status, "image request returned error status");
        discard(&downloaded).await;
        return ImageOutcome::Failed;
    }

    let content_type = downloaded
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let destination = output_dir.join(page_file_name(position, &downloaded.url, content_type));

    gate.wait_if_paused().await;
    match move_file(&downloaded.path, &destination).await {
        Ok(()) => {
            debug!(path = %destination.display(), bytes = downloaded.bytes, "image saved");
            ImageOutcome::Saved(destination)
        }
        Err(e) => {
            warn!(path = %destination.display(), error = %e, "failed to save image");
            discard(&downloaded).await;
            ImageOutcome::Failed
        }
    }
}

/// Renames `from` to `to`, copying when they sit on different filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

async fn discard(file: &DownloadedFile) {
    if let Err(e) = tokio::fs::remove_file(&file.path).await {
        debug!(path = %file.path.display(), error = %e, "could not remove temporary file");
    }
}
