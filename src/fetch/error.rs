//! Error types for the fetch module.
//!
//! The fetcher never inspects status codes on its own; [`FetchError::BadStatus`]
//! exists for callers that turn a non-2xx response into a failure.

use std::error::Error as _;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching pages or images.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS, timeouts, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response, raised by callers via `error_for_status`.
    #[error("HTTP {status} fetching {url}")]
    BadStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The request was cancelled before it completed.
    #[error("request to {url} was cancelled")]
    Cancelled {
        /// The URL whose request was cancelled.
        url: String,
    },

    /// The provided URL is malformed or has no host.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// File system error while writing a download.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Creates an error from a transport failure.
    ///
    /// Transport errors whose cause chain reports an interrupted or aborted
    /// I/O operation are reported as [`FetchError::Cancelled`], so callers
    /// only ever see one representation of cancellation.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if is_transport_cancellation(&source) {
            return Self::Cancelled { url };
        }
        Self::Network { url, source }
    }

    /// Creates a bad-status error.
    pub fn bad_status(url: impl Into<String>, status: u16) -> Self {
        Self::BadStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for cancellations, which callers filter out instead of reporting.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

fn is_transport_cancellation(error: &reqwest::Error) -> bool {
    let mut cause = error.source();
    while let Some(current) = cause {
        if let Some(io) = current.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::ConnectionAborted
            )
        {
            return true;
        }
        cause = current.source();
    }
    false
}
