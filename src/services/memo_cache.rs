// Memoization cache for gateway calls
//
// LRU eviction with TTL expiry, keyed by a content hash of the call inputs.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
    /// Logical clock value of the last read or write
    last_used: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    clock: u64,
    stats: CacheStats,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct MemoCache<V> {
    inner: Mutex<Inner<V>>,
    max_entries: usize,
    ttl: Duration,
}

impl<V: Clone> MemoCache<V> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                clock: 0,
                stats: CacheStats::default(),
            }),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Content hash of a call: the method name plus every input, each
    /// length-prefixed so that ("ab", "c") and ("a", "bc") differ.
    pub fn key(method: &str, inputs: &[&str]) -> String {
        let mut hasher = DefaultHasher::new();
        for input in inputs {
            input.len().hash(&mut hasher);
            input.hash(&mut hasher);
        }
        format!("{}:{:x}", method, hasher.finish())
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        // A panic while holding the lock cannot leave an entry half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.clock += 1;
        let now = inner.clock;

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if entry.stored_at.elapsed() > self.ttl => true,
            Some(entry) => {
                entry.last_used = now;
                let value = entry.value.clone();
                inner.stats.hits += 1;
                tracing::debug!("Cache hit for key: {}", key);
                return Some(value);
            }
            None => false,
        };

        if expired {
            inner.entries.remove(key);
            inner.stats.expirations += 1;
            tracing::debug!("Cache expired for key: {}", key);
        }
        inner.stats.misses += 1;
        tracing::debug!("Cache miss for key: {}", key);
        None
    }

    pub fn put(&self, key: String, value: V) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.clock += 1;
        let now = inner.clock;

        if inner.entries.len() >= self.max_entries && !inner.entries.contains_key(&key) {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                inner.stats.evictions += 1;
                tracing::debug!("Evicted cache entry: {}", oldest);
            }
        }

        inner.entries.insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
                last_used: now,
            },
        );
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        tracing::info!("Cleared {} cache entries", count);
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
