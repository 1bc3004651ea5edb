//! Bounded LRU caches for query embeddings and search results.
//!
//! Both caches are keyed by the normalized query string. Entries are
//! inserted whole under a mutex, so readers never see a partial value.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use serde::Serialize;

/// Thread-safe LRU keyed by normalized query.
pub struct BoundedCache<V> {
    inner: Mutex<LruCache<String, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Occupancy and hit counters, reported by diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl<V: Clone> BoundedCache<V> {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let found = self.lock().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Insert or refresh `key`, evicting the least recently used entry when
    /// full.
    pub fn insert(&self, key: String, value: V) {
        self.lock().put(key, value);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.lock();
        CacheStats {
            entries: cache.len(),
            capacity: cache.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, V>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
