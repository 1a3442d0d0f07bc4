//! LRU cache of regrid weights keyed on source and target axes.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::projection::Regridder;
use crate::types::{CacheStats, LatLonGrid};

/// Cache key: (source grid fingerprint, target grid fingerprint).
pub type WeightKey = (u64, u64);

/// LRU cache of [`Regridder`]s, one per distinct source grid.
pub struct WeightCache {
    cache: LruCache<WeightKey, Arc<Regridder>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl WeightCache {
    /// Create a cache holding at most `capacity` weight sets.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return cached weights for (source, target), computing them on a miss.
    pub fn get_or_build(&mut self, source: &LatLonGrid, target: &LatLonGrid) -> Result<Arc<Regridder>> {
        let key = (source.fingerprint(), target.fingerprint());

        if let Some(regridder) = self.cache.get(&key) {
            if regridder.matches_source(source) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(regridder));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let regridder = Arc::new(Regridder::new(source, target)?);
        if let Some((evicted, _)) = self.cache.push(key, Arc::clone(&regridder)) {
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(regridder)
    }

    /// Check if a key exists in the cache without updating LRU order.
    pub fn contains(&self, key: &WeightKey) -> bool {
        self.cache.contains(key)
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_after_miss() {
        let mut cache = WeightCache::new(4);
        let source = LatLonGrid::regular(-88.75, 2.5, 72, 0.0, 3.75, 96);
        let target = LatLonGrid::common();

        let a = cache.get_or_build(&source, &target).unwrap();
        let b = cache.get_or_build(&source, &target).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
        assert!(cache.contains(&(source.fingerprint(), target.fingerprint())));
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = WeightCache::new(1);
        let target = LatLonGrid::new(vec![0.0], vec![0.0]);
        let a = LatLonGrid::regular(-10.0, 10.0, 3, 0.0, 90.0, 4);
        let b = LatLonGrid::regular(-20.0, 20.0, 3, 0.0, 90.0, 4);

        cache.get_or_build(&a, &target).unwrap();
        cache.get_or_build(&b, &target).unwrap();
        cache.get_or_build(&a, &target).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.evictions, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let mut cache = WeightCache::new(2);
        let bad = LatLonGrid::new(vec![1.0, 1.0], vec![0.0]);
        assert!(cache.get_or_build(&bad, &LatLonGrid::common()).is_err());
        assert!(cache.is_empty());
    }
}
