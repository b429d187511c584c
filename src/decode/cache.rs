//! Count- and cost-bounded LRU of decoded images.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::trace;

use super::decoder::DecodedImage;

/// LRU cache bounded by entry count and total memory cost.
///
/// Values are `Arc`s: evicting an entry only drops the cache's reference, so
/// a consumer still holding the image keeps it alive.
#[derive(Debug)]
pub struct BoundedImageCache {
    entries: LruCache<String, Arc<DecodedImage>>,
    total_cost: usize,
    max_cost: usize,
}

impl BoundedImageCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(max_entries: NonZeroUsize, max_cost: usize) -> Self {
        Self {
            entries: LruCache::new(max_entries),
            total_cost: 0,
            max_cost,
        }
    }

    /// Returns the entry for `key`, marking it most recently used.
    pub fn get(&mut self, key: &str) -> Option<Arc<DecodedImage>> {
        self.entries.get(key).cloned()
    }

    /// Returns whether `key` is cached without touching recency.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Inserts `image` under `key`, evicting least recently used entries
    /// until both bounds hold.
    ///
    /// Returns `false` (and caches nothing) when the image alone exceeds the
    /// cost ceiling.
    pub fn insert(&mut self, key: String, image: Arc<DecodedImage>) -> bool {
        let cost = image.memory_cost();
        if cost > self.max_cost {
            trace!(key = %key, cost, max_cost = self.max_cost, "image exceeds cache ceiling");
            return false;
        }

        // push() hands back either the replaced value for `key` or the evicted LRU entry.
        if let Some((_, displaced)) = self.entries.push(key, image) {
            self.total_cost -= displaced.memory_cost();
        }
        self.total_cost += cost;

        while self.total_cost > self.max_cost {
            let Some((evicted_key, evicted)) = self.entries.pop_lru() else {
                break;
            };
            trace!(key = %evicted_key, "evicted for cost");
            self.total_cost -= evicted.memory_cost();
        }
        true
    }

    /// Removes `key`, returning its image.
    pub fn remove(&mut self, key: &str) -> Option<Arc<DecodedImage>> {
        let removed = self.entries.pop(key)?;
        self.total_cost -= removed.memory_cost();
        Some(removed)
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_cost = 0;
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the memory cost of every cached entry.
    #[must_use]
    pub fn total_cost(&self) -> usize {
        self.total_cost
    }

    /// Configured cost ceiling.
    #[must_use]
    pub fn max_cost(&self) -> usize {
        self.max_cost
    }
}
