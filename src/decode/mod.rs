//! Single-flight decode cache for local page images.
//!
//! [`DecodeCache::get`] returns a display-ready [`DecodedImage`] for a
//! resource identity (a filesystem path or `file://` URL). Concurrent
//! requests for one key share a single decode; finished decodes land in a
//! bounded LRU so re-reads are free.
//!
//! The decode itself runs in a detached task on a blocking worker, so a
//! caller that stops waiting never cancels work other callers rely on. If
//! that task dies, its in-flight record is dropped and every waiter receives
//! an empty result. Failures are never cached: the next `get` tries again.
//!
//! # Example
//!
//! ```no_run
//! use comicfetch_core::decode::DecodeCache;
//!
//! # async fn demo() {
//! let cache = DecodeCache::with_defaults();
//! if let Some(image) = cache.get("/comics/ch1/001.png", 1600).await {
//!     println!("{}x{}", image.width, image.height);
//! }
//! # }
//! ```

mod cache;
mod decoder;
mod single_flight;

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, instrument, trace};

pub use cache::BoundedImageCache;
pub use decoder::{
    DecodedImage, ImageDecoder, RasterDecoder, is_readable_image_file, local_file_path,
};
pub use single_flight::{DecodeOutcome, Flight, InFlightRegistry, LeaderGuard};

/// Default maximum number of cached images.
pub const DEFAULT_CACHE_ENTRIES: usize = 64;

/// Default ceiling on the summed pixel bytes of cached images (256 MiB).
pub const DEFAULT_CACHE_COST_BYTES: usize = 256 * 1024 * 1024;

/// Decode cache shared by every reader of the process.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct DecodeCache {
    decoder: Arc<dyn ImageDecoder>,
    entries: Arc<Mutex<BoundedImageCache>>,
    in_flight: Arc<InFlightRegistry>,
}

impl std::fmt::Debug for DecodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeCache")
            .field("entries", &self.len())
            .field("total_cost", &self.total_cost())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl DecodeCache {
    /// Creates a cache around `decoder`. A `max_entries` of zero is treated as one.
    #[must_use]
    pub fn new(decoder: Arc<dyn ImageDecoder>, max_entries: usize, max_cost: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            decoder,
            entries: Arc::new(Mutex::new(BoundedImageCache::new(max_entries, max_cost))),
            in_flight: Arc::new(InFlightRegistry::new()),
        }
    }

    /// Creates a cache using [`RasterDecoder`] and the default bounds.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(RasterDecoder),
            DEFAULT_CACHE_ENTRIES,
            DEFAULT_CACHE_COST_BYTES,
        )
    }

    /// Returns the decoded image for `key`, decoding it at most once across
    /// concurrent callers.
    ///
    /// `target_max_dimension` bounds the longer side of a fresh decode; a
    /// cached entry is returned as is. `None` means the resource is not a
    /// readable local image.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str, target_max_dimension: u32) -> Option<Arc<DecodedImage>> {
        if let Some(hit) = lock(&self.entries).get(key) {
            trace!("decode cache hit");
            return Some(hit);
        }

        let receiver = match self.in_flight.join(key) {
            Flight::Waiter(receiver) => {
                trace!("joined in-flight decode");
                receiver
            }
            Flight::Leader(guard, receiver) => {
                self.spawn_decode(guard, target_max_dimension);
                receiver
            }
        };

        // A closed channel means the leader vanished without an outcome.
        receiver.await.ok().flatten()
    }

    /// Same as [`get`](Self::get) but discards the image once it is cached.
    pub async fn warm(&self, key: &str, target_max_dimension: u32) {
        let _ = self.get(key, target_max_dimension).await;
    }

    fn spawn_decode(&self, guard: LeaderGuard, target_max_dimension: u32) {
        let decoder = Arc::clone(&self.decoder);
        let entries = Arc::clone(&self.entries);

        tokio::spawn(async move {
            let key = guard.key().to_string();

            // Another leader may have finished between our cache miss and join.
            if let Some(hit) = lock(&entries).get(&key) {
                guard.complete(&Some(hit));
                return;
            }

            let blocking_key = key.clone();
            let decoded = tokio::task::spawn_blocking(move || {
                decode_local(decoder.as_ref(), &blocking_key, target_max_dimension)
            })
            .await;

            let outcome = match decoded {
                Ok(image) => image.map(Arc::new),
                Err(e) => {
                    debug!(key = %key, error = %e, "decode worker failed");
                    None
                }
            };

            if let Some(image) = &outcome {
                if !lock(&entries).insert(key.clone(), Arc::clone(image)) {
                    debug!(key = %key, cost = image.memory_cost(), "decoded image too large to cache");
                }
            }
            guard.complete(&outcome);
        });
    }

    /// Returns whether `key` is cached.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains(key)
    }

    /// Evicts `key`, returning whether it was cached.
    pub fn remove(&self, key: &str) -> bool {
        lock(&self.entries).remove(key).is_some()
    }

    /// Evicts everything. Decodes in flight still complete and insert.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Number of cached images.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Summed memory cost of cached images.
    #[must_use]
    pub fn total_cost(&self) -> usize {
        lock(&self.entries).total_cost()
    }

    /// Number of decodes currently underway.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

fn decode_local(decoder: &dyn ImageDecoder, key: &str, max_dimension: u32) -> Option<DecodedImage> {
    let Some(path) = local_file_path(key) else {
        debug!(key = %key, "not a local resource");
        return None;
    };
    if !is_readable_image_file(&path) {
        debug!(path = %path.display(), "missing or empty image file");
        return None;
    }
    decoder.decode(&path, max_dimension)
}

fn lock(entries: &Mutex<BoundedImageCache>) -> MutexGuard<'_, BoundedImageCache> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}
