//! Polite network access for page and image requests.
//!
//! Every outbound request goes through a [`PoliteFetcher`], which first asks
//! the shared [`RateLimiter`] for permission so that request starts to the
//! same host are spaced by a minimum interval. A separate per-host
//! connection ceiling bounds how many requests to one host are open at once.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use comicfetch_core::fetch::{FetcherOptions, PoliteFetcher, RateLimiter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_millis(250)));
//! let fetcher = PoliteFetcher::new(FetcherOptions::default(), limiter)?;
//! let page = fetcher
//!     .get("https://example.com/comic/1", None)
//!     .await?
//!     .error_for_status()?;
//! println!("{} bytes", page.body.len());
//! # Ok(())
//! # }
//! ```

mod client;
pub(crate) mod constants;
mod error;
pub mod rate_limiter;

pub use client::{DownloadedFile, FetchHead, FetchResponse, FetcherOptions, PoliteFetcher};
pub use error::FetchError;
pub use rate_limiter::{DEFAULT_MIN_INTERVAL, RateLimiter, extract_host};
