//! Sliding prefetch window over an ordered list of page images.
//!
//! The reader keeps a neighborhood of pages around the current position
//! decoded and ready. [`WindowPrefetcher::ensure_loaded_window`] fills that
//! neighborhood through the shared [`DecodeCache`] in small concurrent
//! batches, then forgets pages that fell outside it.
//!
//! The "loaded" set is logical: forgetting an index does not evict its image
//! from the cache, which has its own bounds. A page the reader just left is
//! usually still cached when they flip back to it.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::join_all;
use tracing::{debug, instrument};

use crate::decode::DecodeCache;

/// Smallest decode target, regardless of viewport.
pub const MIN_TARGET_DIMENSION: u32 = 256;

/// Default number of concurrent decodes per batch.
pub const DEFAULT_BATCH_SIZE: usize = 6;

/// Display surface the pages are rendered into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Width in points.
    pub width: u32,
    /// Height in points.
    pub height: u32,
    /// Pixels per point.
    pub scale: f64,
}

impl Viewport {
    /// Creates a viewport.
    #[must_use]
    pub fn new(width: u32, height: u32, scale: f64) -> Self {
        Self {
            width,
            height,
            scale,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1024, 768, 1.0)
    }
}

/// Decode target for `viewport`: its longer side in pixels, clamped to
/// `[MIN_TARGET_DIMENSION, max_pixel]`. The lower bound wins when
/// `max_pixel` is below it.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn target_dimension(viewport: Viewport, max_pixel: u32) -> u32 {
    let longest = f64::from(viewport.width.max(viewport.height));
    let pixels = (longest * viewport.scale).ceil();
    // `as` saturates; NaN becomes 0 and is lifted by the clamp.
    let pixels = pixels as u32;
    pixels.clamp(MIN_TARGET_DIMENSION, max_pixel.max(MIN_TARGET_DIMENSION))
}

/// How a call to [`WindowPrefetcher::ensure_loaded_window`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFill {
    /// Every index of the neighborhood was processed and stale indices dropped.
    Completed,
    /// The interrupt flag was raised; indices loaded so far stay loaded.
    Cancelled,
    /// Nothing to do: empty sequence or index out of range.
    Empty,
}

/// Keeps a window of decoded pages around the reading position.
#[derive(Debug)]
pub struct WindowPrefetcher {
    cache: Arc<DecodeCache>,
    items: Vec<String>,
    loaded: BTreeSet<usize>,
    viewport: Viewport,
    max_pixel: u32,
    batch_size: usize,
}

impl WindowPrefetcher {
    /// Creates a prefetcher over `items` (resource identities in reading order).
    #[must_use]
    pub fn new(
        cache: Arc<DecodeCache>,
        items: Vec<String>,
        viewport: Viewport,
        max_pixel: u32,
    ) -> Self {
        Self {
            cache,
            items,
            loaded: BTreeSet::new(),
            viewport,
            max_pixel,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the decode fan-out per batch (at least 1).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Updates the viewport used for subsequent decode targets.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Decode target derived from the current viewport.
    #[must_use]
    pub fn target_dimension(&self) -> u32 {
        target_dimension(self.viewport, self.max_pixel)
    }

    /// Ensures every index within `radius` of `current` is loaded.
    ///
    /// `current` is marked loaded first. Missing indices are decoded nearest
    /// first, `batch_size` at a time; each batch settles before the next
    /// starts. `interrupt` is checked before and after every batch. Indices
    /// outside the neighborhood are dropped on every exit, so a cancelled fill
    /// leaves a subset of the new neighborhood and the loaded set never holds
    /// more than `2 * radius + 1` indices.
    #[instrument(skip(self, interrupt), fields(count = self.items.len()))]
    pub async fn ensure_loaded_window(
        &mut self,
        current: usize,
        radius: usize,
        interrupt: &AtomicBool,
    ) -> WindowFill {
        let count = self.items.len();
        if current >= count {
            debug!("window request out of range");
            return WindowFill::Empty;
        }

        let first = current.saturating_sub(radius);
        let last = current.saturating_add(radius).min(count - 1);

        let mut missing: Vec<usize> = (first..=last)
            .filter(|index| !self.loaded.contains(index))
            .collect();
        missing.sort_by_key(|&index| (index.abs_diff(current), index));
        self.loaded.insert(current);

        let target = self.target_dimension();
        for batch in missing.chunks(self.batch_size) {
            if interrupt.load(Ordering::SeqCst) {
                return self.cancel_fill(first, last);
            }

            let cache = &self.cache;
            let items = &self.items;
            join_all(batch.iter().map(|&index| cache.warm(&items[index], target))).await;
            self.loaded.extend(batch.iter().copied());

            if interrupt.load(Ordering::SeqCst) {
                return self.cancel_fill(first, last);
            }
        }

        self.loaded.retain(|index| (first..=last).contains(index));
        debug!(first, last, decoded = missing.len(), "window filled");
        WindowFill::Completed
    }

    fn cancel_fill(&mut self, first: usize, last: usize) -> WindowFill {
        self.loaded.retain(|index| (first..=last).contains(index));
        debug!(loaded = self.loaded.len(), "window fill cancelled");
        WindowFill::Cancelled
    }

    /// Indices currently considered loaded, ascending.
    #[must_use]
    pub fn loaded_indices(&self) -> &BTreeSet<usize> {
        &self.loaded
    }

    /// Returns whether `index` is in the loaded set.
    #[must_use]
    pub fn is_loaded(&self, index: usize) -> bool {
        self.loaded.contains(&index)
    }

    /// Number of items in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true for an empty sequence.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Resource identities in reading order.
    #[must_use]
    pub fn items(&self) -> &[String] {
        &self.items
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    use tempfile::TempDir;

    use crate::decode::{DecodedImage, ImageDecoder};

    /// Returns a 1x1 image; raises `trip` once `trip_after` decodes have run.
    struct TrippingDecoder {
        calls: AtomicUsize,
        trip_after: usize,
        trip: Arc<AtomicBool>,
    }

    impl ImageDecoder for TrippingDecoder {
        fn decode(&self, _path: &Path, _max_dimension: u32) -> Option<DecodedImage> {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if calls >= self.trip_after {
                self.trip.store(true, Ordering::SeqCst);
            }
            Some(DecodedImage {
                width: 1,
                height: 1,
                pixels: vec![0; 4],
            })
        }
    }

    fn page_files(dir: &TempDir, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                let path = dir.path().join(format!("{i:03}.png"));
                std::fs::write(&path, b"page").unwrap();
                path.to_string_lossy().into_owned()
            })
            .collect()
    }

    fn prefetcher(
        items: Vec<String>,
        trip_after: usize,
    ) -> (WindowPrefetcher, Arc<AtomicBool>, Arc<TrippingDecoder>) {
        let trip = Arc::new(AtomicBool::new(false));
        let decoder = Arc::new(TrippingDecoder {
            calls: AtomicUsize::new(0),
            trip_after,
            trip: Arc::clone(&trip),
        });
        let cache = Arc::new(DecodeCache::new(decoder.clone(), 256, 1 << 20));
        let window = WindowPrefetcher::new(cache, items, Viewport::default(), 2048);
        (window, trip, decoder)
    }

    #[tokio::test]
    async fn test_fill_loads_clamped_neighborhood() {
        let dir = TempDir::new().unwrap();
        let (mut window, trip, decoder) = prefetcher(page_files(&dir, 100), usize::MAX);

        let fill = window.ensure_loaded_window(50, 5, &trip).await;

        assert_eq!(fill, WindowFill::Completed);
        let expected: BTreeSet<usize> = (45..=55).collect();
        assert_eq!(window.loaded_indices(), &expected);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_window_clamps_at_sequence_edges() {
        let dir = TempDir::new().unwrap();
        let (mut window, trip, _) = prefetcher(page_files(&dir, 10), usize::MAX);

        window.ensure_loaded_window(1, 3, &trip).await;
        assert_eq!(window.loaded_indices(), &(0..=4).collect::<BTreeSet<_>>());

        window.ensure_loaded_window(9, 3, &trip).await;
        assert_eq!(window.loaded_indices(), &(6..=9).collect::<BTreeSet<_>>());
    }

    #[tokio::test]
    async fn test_moving_window_evicts_stale_indices_but_keeps_cache() {
        let dir = TempDir::new().unwrap();
        let items = page_files(&dir, 30);
        let (mut window, trip, decoder) = prefetcher(items.clone(), usize::MAX);

        window.ensure_loaded_window(10, 2, &trip).await;
        window.ensure_loaded_window(12, 2, &trip).await;

        assert_eq!(window.loaded_indices(), &(10..=14).collect::<BTreeSet<_>>());
        assert!(!window.is_loaded(8));
        // Only 13 and 14 were new on the second call.
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 7);
        assert!(window.cache.contains(&items[8]));
    }

    #[tokio::test]
    async fn test_cancel_mid_fill_leaves_partial_subset() {
        let dir = TempDir::new().unwrap();
        let (window, trip, _) = prefetcher(page_files(&dir, 100), 2);
        let mut window = window.with_batch_size(2);

        let fill = window.ensure_loaded_window(50, 5, &trip).await;

        assert_eq!(fill, WindowFill::Cancelled);
        let neighborhood: BTreeSet<usize> = (45..=55).collect();
        let loaded = window.loaded_indices();
        assert!(loaded.is_subset(&neighborhood));
        assert!(loaded.contains(&50));
        assert!(loaded.len() < neighborhood.len());
    }

    #[tokio::test]
    async fn test_cancel_before_first_batch_drops_stale_indices() {
        let dir = TempDir::new().unwrap();
        let (mut window, trip, decoder) = prefetcher(page_files(&dir, 20), usize::MAX);
        window.ensure_loaded_window(2, 1, &trip).await;

        trip.store(true, Ordering::SeqCst);
        let fill = window.ensure_loaded_window(15, 2, &trip).await;

        assert_eq!(fill, WindowFill::Cancelled);
        let expected: BTreeSet<usize> = [15].into_iter().collect();
        assert_eq!(window.loaded_indices(), &expected);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_jump_keeps_loaded_set_within_radius_bound() {
        let dir = TempDir::new().unwrap();
        let (mut window, trip, _) = prefetcher(page_files(&dir, 100), usize::MAX);
        window.ensure_loaded_window(10, 5, &trip).await;
        assert_eq!(window.loaded_indices().len(), 11);

        trip.store(true, Ordering::SeqCst);
        let fill = window.ensure_loaded_window(50, 1, &trip).await;

        assert_eq!(fill, WindowFill::Cancelled);
        let loaded = window.loaded_indices();
        assert!(loaded.len() <= 3);
        assert!(loaded.iter().all(|index| (49..=51).contains(index)));
        assert!(loaded.contains(&50));
    }

    #[tokio::test]
    async fn test_out_of_range_and_empty_are_noops() {
        let dir = TempDir::new().unwrap();
        let (mut window, trip, _) = prefetcher(page_files(&dir, 3), usize::MAX);
        assert_eq!(
            window.ensure_loaded_window(3, 1, &trip).await,
            WindowFill::Empty
        );
        assert!(window.loaded_indices().is_empty());

        let (mut empty, trip, _) = prefetcher(Vec::new(), usize::MAX);
        assert!(empty.is_empty());
        assert_eq!(
            empty.ensure_loaded_window(0, 4, &trip).await,
            WindowFill::Empty
        );
    }

    #[tokio::test]
    async fn test_zero_radius_loads_only_current() {
        let (mut window, trip, _) = prefetcher(vec!["https://remote/a.png".into(); 5], usize::MAX);
        assert_eq!(
            window.ensure_loaded_window(2, 0, &trip).await,
            WindowFill::Completed
        );
        assert_eq!(window.loaded_indices(), &BTreeSet::from([2]));
    }

    #[tokio::test]
    async fn test_failed_decodes_still_count_as_loaded() {
        let items: Vec<String> = (0..10).map(|i| format!("/does/not/exist/{i}.png")).collect();
        let (mut window, trip, decoder) = prefetcher(items, usize::MAX);

        window.ensure_loaded_window(5, 2, &trip).await;
        assert_eq!(window.loaded_indices(), &(3..=7).collect::<BTreeSet<_>>());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_target_dimension_uses_scaled_longer_side() {
        assert_eq!(target_dimension(Viewport::new(800, 1200, 2.0), 4096), 2400);
        assert_eq!(target_dimension(Viewport::new(1001, 10, 1.5), 4096), 1502);
    }

    #[test]
    fn test_target_dimension_is_clamped() {
        assert_eq!(target_dimension(Viewport::new(800, 1200, 2.0), 2048), 2048);
        assert_eq!(target_dimension(Viewport::new(100, 50, 1.0), 2048), 256);
        assert_eq!(target_dimension(Viewport::new(800, 600, 1.0), 128), 256);
        assert_eq!(target_dimension(Viewport::new(800, 600, f64::NAN), 2048), 256);
    }

    #[test]
    fn test_batch_size_has_floor_of_one() {
        let (window, _, _) = prefetcher(Vec::new(), usize::MAX);
        assert_eq!(window.with_batch_size(0).batch_size, 1);
    }
}
