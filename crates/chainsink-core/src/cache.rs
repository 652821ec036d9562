//! Bounded TTL cache.
//!
//! A small insertion-ordered cache used in front of the store for ABIs,
//! event signatures and contract metadata. It is an optimization only:
//! every miss falls through to the store, so eviction is never a
//! correctness concern.

use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio::task::JoinHandle;

pub const DEFAULT_MAX_SIZE: usize = 1000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Insertion-ordered cache with a size bound and per-entry TTL.
///
/// At capacity the oldest entry is evicted; expired entries read as absent.
/// Internally synchronized, shareable behind an `Arc`.
pub struct BoundedCache<K, V> {
    inner: Mutex<IndexMap<K, Entry<V>>>,
    max_size: usize,
    ttl: Duration,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self { inner: Mutex::new(IndexMap::new()), max_size, ttl }
    }

    /// Look up a key; expired entries are removed and read as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match map.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                map.shift_remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert a value, evicting the oldest entry at capacity.
    pub fn set(&self, key: K, value: V) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !map.contains_key(&key) && map.len() >= self.max_size {
            map.shift_remove_index(0);
        }
        map.insert(key, Entry { value, inserted_at: Instant::now() });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = map.len();
        let ttl = self.ttl;
        map.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        before - map.len()
    }
}

impl<K, V> Default for BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_TTL)
    }
}

/// Spawn a background task that sweeps the cache at a fixed interval.
///
/// The task runs until the returned handle is aborted.
pub fn spawn_sweeper<K, V>(cache: Arc<BoundedCache<K, V>>, interval: Duration) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick completes immediately
        loop {
            ticker.tick().await;
            let removed = cache.sweep();
            if removed > 0 {
                tracing::debug!(removed, "cache sweep evicted expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_evicts_oldest_first() {
        let cache = BoundedCache::new(2, Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn overwrite_does_not_evict() {
        let cache = BoundedCache::new(2, Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let cache = BoundedCache::new(10, Duration::from_millis(20));
        cache.set("k", 1);
        assert_eq!(cache.get(&"k"), Some(1));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get(&"k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let cache = BoundedCache::new(10, Duration::from_millis(30));
        cache.set("old", 1);
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.set("new", 2);
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.get(&"new"), Some(2));
    }
}
