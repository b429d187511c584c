//! Process-wide collaborators, built once and shared by reference.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::PipelineConfig;
use crate::decode::{DecodeCache, RasterDecoder};
use crate::fetch::{FetchError, PoliteFetcher, RateLimiter};
use crate::gate::CommitGate;
use crate::window::{Viewport, WindowPrefetcher};

/// Owns the single rate limiter, commit gate, fetcher and decode cache of a
/// process and hands out shared handles to them.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: PipelineConfig,
    rate_limiter: Arc<RateLimiter>,
    gate: Arc<CommitGate>,
    fetcher: Arc<PoliteFetcher>,
    decode_cache: Arc<DecodeCache>,
}

impl AppContext {
    /// Builds every collaborator from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the HTTP client cannot be built.
    pub fn new(config: PipelineConfig) -> Result<Self, FetchError> {
        let rate_limiter = Arc::new(RateLimiter::new(Duration::from_millis(
            config.min_interval_ms,
        )));
        let fetcher = PoliteFetcher::new(config.fetcher_options(), Arc::clone(&rate_limiter))?;
        let decode_cache = DecodeCache::new(
            Arc::new(RasterDecoder),
            config.cache_max_entries,
            config.cache_max_cost_bytes,
        );
        debug!(
            per_host = config.per_host,
            min_interval_ms = config.min_interval_ms,
            cache_entries = config.cache_max_entries,
            "application context ready"
        );

        Ok(Self {
            config,
            rate_limiter,
            gate: Arc::new(CommitGate::new()),
            fetcher: Arc::new(fetcher),
            decode_cache: Arc::new(decode_cache),
        })
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process-wide per-host spacing shared by every fetch.
    #[must_use]
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    /// Gate that holds file commits while paused.
    #[must_use]
    pub fn gate(&self) -> Arc<CommitGate> {
        Arc::clone(&self.gate)
    }

    /// Shared polite fetcher; its interrupt handle cancels all requests.
    #[must_use]
    pub fn fetcher(&self) -> Arc<PoliteFetcher> {
        Arc::clone(&self.fetcher)
    }

    /// Decode cache shared by every window built from this context.
    #[must_use]
    pub fn decode_cache(&self) -> Arc<DecodeCache> {
        Arc::clone(&self.decode_cache)
    }

    /// Builds a window prefetcher over `items` bound to the shared cache.
    #[must_use]
    pub fn window_for(&self, items: Vec<String>, viewport: Viewport) -> WindowPrefetcher {
        WindowPrefetcher::new(
            self.decode_cache(),
            items,
            viewport,
            self.config.downsample_max_pixel,
        )
    }
}
