//! Per-host request spacing for outbound fetches.
//!
//! This module provides the [`RateLimiter`] struct which enforces a minimum
//! interval between the *starts* of requests to the same host, so a crawl
//! never hammers a comic host faster than one request per interval.
//!
//! # Overview
//!
//! All `acquire` calls on one limiter pass through a single serialized
//! section that reads and stamps the per-host state. The stamp is taken at
//! acquire time (the scheduled start of the request), not when the request
//! completes; overlapping in-flight requests are bounded separately by the
//! fetcher's per-host connection ceiling.
//!
//! Callers targeting different hosts only queue behind one another for the
//! duration of that bookkeeping; each then sleeps for its own host's
//! remaining interval, outside the serialized section.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use comicfetch_core::fetch::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_millis(250)));
//!
//! // First request to a host proceeds immediately
//! limiter.acquire("https://example.com/comic/1").await;
//!
//! // Second request to the same host starts 250ms after the first
//! limiter.acquire("https://example.com/comic/2").await;
//!
//! // Other hosts keep their own schedule
//! limiter.acquire("https://cdn.example.net/page.png").await;
//! # }
//! ```

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::constants::CUMULATIVE_DELAY_WARNING_THRESHOLD;

/// Default minimum spacing between request starts to the same host.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(250);

/// Per-host request-start limiter.
///
/// Designed to be wrapped in `Arc` and shared by every component that talks
/// to the network; one instance per process keeps spacing consistent for
/// hosts reached from several places.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum time between request starts to the same host.
    min_interval: Duration,

    /// Whether spacing is disabled (tests, local mirrors).
    disabled: bool,

    /// Per-host throttle state. Entries are only held inside `reserve`,
    /// never across an await.
    hosts: DashMap<String, HostThrottleState>,
}

/// State tracked for each host.
#[derive(Debug)]
struct HostThrottleState {
    /// Scheduled start of the most recent request to this host.
    last_request: Instant,

    /// Total delay imposed on this host, for excessive-throttling warnings.
    cumulative_delay: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl RateLimiter {
    /// Creates a new rate limiter with the given minimum interval.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use comicfetch_core::fetch::RateLimiter;
    ///
    /// let limiter = RateLimiter::new(Duration::from_millis(250));
    /// assert_eq!(limiter.min_interval(), Duration::from_millis(250));
    /// ```
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = min_interval.as_millis()))]
    pub fn new(min_interval: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            min_interval,
            disabled: false,
            hosts: DashMap::new(),
        }
    }

    /// Creates a disabled rate limiter that applies no spacing.
    #[must_use]
    pub fn disabled() -> Self {
        debug!("creating disabled rate limiter");
        Self {
            min_interval: Duration::ZERO,
            disabled: true,
            hosts: DashMap::new(),
        }
    }

    /// Returns whether spacing is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the minimum interval between request starts to one host.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until a request to `url`'s host may start.
    ///
    /// The first request to any host proceeds immediately. Later requests
    /// start no sooner than `min_interval` after the previous start for the
    /// same host. The host's last-request instant is stamped before this
    /// returns, regardless of whether the request is ever sent.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        if self.disabled {
            return;
        }

        let host = extract_host(url);
        tracing::Span::current().record("host", &host);

        let delay = self.reserve(&host, Instant::now());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Stamps the host's next start slot and returns how long the caller must wait for it.
    fn reserve(&self, host: &str, now: Instant) -> Duration {
        let mut entry = match self.hosts.entry(host.to_string()) {
            Entry::Vacant(vacant) => {
                debug!(host = %host, "first request to host - no delay");
                vacant.insert(HostThrottleState {
                    last_request: now,
                    cumulative_delay: Duration::ZERO,
                });
                return Duration::ZERO;
            }
            Entry::Occupied(occupied) => occupied,
        };
        let state = entry.get_mut();

        let earliest = state.last_request + self.min_interval;
        let start = earliest.max(now);
        let delay = start.saturating_duration_since(now);
        state.last_request = start;

        if !delay.is_zero() {
            state.cumulative_delay += delay;
            debug!(
                host = %host,
                delay_ms = delay.as_millis(),
                cumulative_ms = state.cumulative_delay.as_millis(),
                "spacing request start"
            );

            if state.cumulative_delay >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                warn!(
                    host = %host,
                    cumulative_delay_secs = state.cumulative_delay.as_secs(),
                    "excessive throttling - consider fewer requests to this host"
                );
            }
        }

        delay
    }
}

/// Extracts the lowercase host from a URL.
///
/// Returns "unknown" for malformed URLs so they are still throttled together.
///
/// # Examples
///
/// ```
/// use comicfetch_core::fetch::extract_host;
///
/// assert_eq!(extract_host("https://Example.COM/comic/1"), "example.com");
/// assert_eq!(extract_host("https://localhost:8080/x"), "localhost");
/// assert_eq!(extract_host("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_rate_limiter_new_creates_with_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        assert_eq!(limiter.min_interval(), Duration::from_millis(500));
        assert!(!limiter.is_disabled());
    }

    #[test]
    fn test_rate_limiter_default_is_250ms() {
        assert_eq!(RateLimiter::default().min_interval(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled_no_delay() {
        tokio::time::pause();

        let limiter = RateLimiter::disabled();
        let start = Instant::now();

        limiter.acquire("https://example.com/1").await;
        limiter.acquire("https://example.com/2").await;
        limiter.acquire("https://example.com/3").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_sequential_starts() {
        tokio::time::pause();

        let limiter = RateLimiter::new(Duration::from_millis(250));
        let t0 = Instant::now();

        limiter.acquire("https://example.com/1").await;
        let first = t0.elapsed();
        limiter.acquire("https://example.com/2").await;
        let second = t0.elapsed();
        limiter.acquire("https://example.com/3").await;
        let third = t0.elapsed();

        assert!(first < Duration::from_millis(10));
        assert!(second >= Duration::from_millis(250));
        assert!(second < Duration::from_millis(300));
        assert!(third >= Duration::from_millis(500));
        assert!(third < Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_rate_limiter_different_hosts_independent() {
        tokio::time::pause();

        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("https://a.com/1").await;
        limiter.acquire("https://b.com/1").await;
        limiter.acquire("https://c.com/1").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_rate_limiter_concurrent_callers_same_host_are_spaced() {
        tokio::time::pause();

        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(250)));
        let t0 = Instant::now();

        let mut handles = Vec::new();
        for i in 0..3 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire(&format!("https://example.com/{i}")).await;
                t0.elapsed()
            }));
        }

        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap());
        }
        starts.sort();

        assert!(starts[0] < Duration::from_millis(10));
        assert!(starts[1] >= Duration::from_millis(250));
        assert!(starts[2] >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_rate_limiter_stamps_at_acquire_not_completion() {
        tokio::time::pause();

        let limiter = RateLimiter::new(Duration::from_millis(250));
        limiter.acquire("https://example.com/1").await;

        // Simulated slow request; spacing is measured from the start above.
        tokio::time::sleep(Duration::from_millis(400)).await;

        let before = Instant::now();
        limiter.acquire("https://example.com/2").await;
        assert!(before.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn test_reserve_tracks_cumulative_delay() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let now = Instant::now();

        assert_eq!(limiter.reserve("example.com", now), Duration::ZERO);
        assert_eq!(
            limiter.reserve("example.com", now),
            Duration::from_millis(100)
        );
        assert_eq!(
            limiter.reserve("example.com", now),
            Duration::from_millis(200)
        );

        let state = limiter.hosts.get("example.com").unwrap();
        assert_eq!(state.cumulative_delay, Duration::from_millis(300));
    }

    #[test]
    fn test_extract_host_lowercases() {
        assert_eq!(extract_host("https://Example.COM/Path"), "example.com");
    }

    #[test]
    fn test_extract_host_strips_port() {
        assert_eq!(extract_host("https://example.com:8080/path"), "example.com");
    }

    #[test]
    fn test_extract_host_ip_address() {
        assert_eq!(extract_host("https://192.168.1.1/file"), "192.168.1.1");
    }

    #[test]
    fn test_extract_host_malformed_url() {
        assert_eq!(extract_host("not a valid url"), "unknown");
        assert_eq!(extract_host(""), "unknown");
    }

    #[test]
    fn test_extract_host_subdomain() {
        assert_eq!(extract_host("https://cdn.example.com/v1"), "cdn.example.com");
    }
}
