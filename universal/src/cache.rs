use std::{hash::Hash, num::NonZeroUsize, time::Duration};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::time::SystemTime;

pub const DEFAULT_MAX_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: SystemTime,
    /// `None` means the entry never expires.
    ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: SystemTime) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        // If the clock went backwards, the entry is younger than its TTL.
        now.duration_since(self.created_at)
            .map(|age| age > ttl)
            .unwrap_or(false)
    }
}

/// A size-bounded key-value store with least-recently-used eviction and optional per-entry expiry.
///
/// Expiry is checked lazily when an entry is read, there is no background sweeper. Both reads and writes make an entry
/// the most recently used. All operations hold a single lock for their whole duration, so the cache can be shared
/// between concurrent callers.
#[derive(Debug)]
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
}

impl<K: Hash + Eq, V: Clone> Default for BoundedCache<K, V> {
    fn default() -> Self {
        BoundedCache::new(DEFAULT_MAX_SIZE)
    }
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// A cache holding at most `max_size` entries. A `max_size` of zero is treated as one.
    pub fn new(max_size: usize) -> Self {
        let max_size = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        BoundedCache {
            entries: Mutex::new(LruCache::new(max_size)),
        }
    }

    /// Returns the value for `key`, unless it is missing or has expired. Expired entries are removed.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let expired = entries.peek(key)?.is_expired(SystemTime::now());
        if expired {
            trace!("cache entry expired");
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert `value` as the most recently used entry. If `key` is new and the cache is full, the least recently used
    /// entry is evicted first.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let mut entries = self.entries.lock();
        // Re-inserting an existing key takes a fresh slot rather than updating in place.
        entries.pop(&key);
        let entry = CacheEntry {
            value,
            created_at: SystemTime::now(),
            ttl,
        };
        if entries.push(key, entry).is_some() {
            trace!(capacity = entries.cap().get(), "evicted least recently used cache entry");
        }
    }

    pub fn clear(&self, key: &K) {
        self.entries.lock().pop(key);
    }

    pub fn clear_all(&self) {
        self.entries.lock().clear();
    }

    /// The number of entries held, including any that have expired but not yet been read.
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn max_size(&self) -> usize {
        self.entries.lock().cap().get()
    }
}
