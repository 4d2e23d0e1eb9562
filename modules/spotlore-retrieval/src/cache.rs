//! Bounded TTL memoization for embeddings and vector-search results.
//!
//! Entries expire on wall-clock time and are evicted lazily on read. The
//! clock is injected so expiry behavior stays testable without sleeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Hit/miss counters for periodic diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

struct Entry<V> {
    value: V,
    /// Absolute expiry; `None` means no TTL.
    expires_at: Option<DateTime<Utc>>,
}

/// A bounded map with per-entry absolute expiry. Not an LRU: when full, one
/// arbitrary entry is evicted, which is acceptable because entries expire
/// independently anyway.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    capacity: usize,
    ttl: Option<Duration>,
    clock: Clock,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self::with_clock(capacity, ttl, system_clock())
    }

    pub fn with_clock(capacity: usize, ttl: Option<Duration>, clock: Clock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Lookup with lazy expiry: an expired entry is removed and counts as a
    /// miss. A hit never returns a value whose TTL has elapsed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = (self.clock)();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) => {
                if entry.expires_at.is_some_and(|at| at <= now) {
                    entries.remove(key);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                } else {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Some(entry.value.clone())
                }
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: String, value: V) {
        let expires_at = self.ttl.map(|ttl| (self.clock)() + ttl);
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            // Evict one arbitrary entry to stay bounded.
            if let Some(victim) = entries.keys().next().cloned() {
                entries.remove(&victim);
            }
        }
        entries.insert(key, Entry { value, expires_at });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache key for an embedding: hash of the normalized text, so trivial
/// whitespace/case variants share one entry.
pub fn embedding_key(text: &str) -> String {
    let normalized = text.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cache key for a vector-search result.
pub fn search_key(query: &str, collection: &str, top_k: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.trim().to_lowercase().as_bytes());
    hasher.update([0u8]);
    hasher.update(collection.as_bytes());
    hasher.update([0u8]);
    hasher.update(top_k.to_le_bytes());
    hex::encode(hasher.finalize())
}
