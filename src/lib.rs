//! Comicfetch Core Library
//!
//! Acquisition pipeline for web-comic page images: find the images on a
//! page, fetch them politely, and keep a window of decoded pages ready
//! around the reading position.
//!
//! # Architecture
//!
//! - [`extract`] - Image URL resolution from page markup (lazy-load
//!   attributes, `srcset`, canonical-key deduplication)
//! - [`fetch`] - Per-host rate limiter and the polite HTTP fetcher
//! - [`gate`] - Pause/resume barrier for commit-sensitive writes
//! - [`decode`] - Single-flight, bounded decode cache
//! - [`window`] - Prefetch window controller over the decode cache
//! - [`pipeline`] - Page download pipeline built on the above
//! - [`config`] / [`context`] - Settings and the process-wide collaborators

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod decode;
pub mod extract;
pub mod fetch;
pub mod gate;
pub mod pipeline;
pub mod user_agent;
pub mod window;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, FileConfig, PipelineConfig};
pub use context::AppContext;
pub use decode::{DecodeCache, DecodedImage, ImageDecoder, RasterDecoder};
pub use extract::{HtmlPage, MarkupDocument, MarkupElement, canonical_key, extract_image_urls};
pub use fetch::{FetchError, PoliteFetcher, RateLimiter};
pub use gate::CommitGate;
pub use pipeline::{PageDownloadReport, PageDownloader, PipelineError};
pub use window::{Viewport, WindowFill, WindowPrefetcher};
