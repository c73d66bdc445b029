//! Time-boxed in-memory cache.
//!
//! Entries expire after a fixed TTL and are evicted lazily the next time they
//! are read. Nothing sweeps the cache in the background.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Thread-safe TTL cache. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    entries: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Insert or replace a value.
    pub fn insert(&self, key: K, value: V) {
        self.entries.write().insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Read a value, evicting it first if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().remove(key);
        None
    }

    /// Remove a single key.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        self.entries.write().remove(key).map(|e| e.value)
    }

    /// Remove every key matching the predicate.
    pub fn invalidate_where(&self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !predicate(k));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
