//! Query-embedding cache
//!
//! Explicit bounded LRU with TTL, guarded by a mutex. Keys are the
//! trimmed lower-cased query text; eviction is oldest-first at capacity.
//! Process-local only; nothing here outlives the service.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default capacity
pub const DEFAULT_CAPACITY: usize = 100;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct Entry {
    vector: Vec<f32>,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Recency order, least recently used first
    order: Vec<String>,
}

/// Bounded LRU + TTL cache for query embeddings
pub struct EmbeddingCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                order: Vec::with_capacity(capacity),
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Normalize a query into its cache key
    pub fn key_for(query: &str) -> String {
        query.trim().to_lowercase()
    }

    /// Fetch a live entry, refreshing its recency
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock().ok()?;

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };

        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }

        // Move to most-recently-used position
        inner.order.retain(|k| k != key);
        inner.order.push(key.to_string());

        inner.entries.get(key).map(|e| e.vector.clone())
    }

    /// Insert an entry, evicting the least recently used at capacity
    pub fn insert(&self, key: String, vector: Vec<f32>) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        } else if inner.entries.len() >= self.capacity && !inner.order.is_empty() {
            let oldest = inner.order.remove(0);
            inner.entries.remove(&oldest);
        }

        inner.entries.insert(
            key.clone(),
            Entry {
                vector,
                inserted_at: Instant::now(),
            },
        );
        inner.order.push(key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_normalization() {
        assert_eq!(EmbeddingCache::key_for("  Budget Emails "), "budget emails");
    }

    #[test]
    fn test_get_returns_inserted_vector() {
        let cache = EmbeddingCache::default();
        cache.insert("query".to_string(), vec![1.0, 2.0]);
        assert_eq!(cache.get("query"), Some(vec![1.0, 2.0]));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn test_eviction_is_oldest_first() {
        let cache = EmbeddingCache::new(2, DEFAULT_TTL);
        cache.insert("a".to_string(), vec![1.0]);
        cache.insert("b".to_string(), vec![2.0]);

        // Touch "a" so "b" becomes the eviction candidate
        assert!(cache.get("a").is_some());

        cache.insert("c".to_string(), vec![3.0]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = EmbeddingCache::new(10, Duration::from_millis(0));
        cache.insert("stale".to_string(), vec![1.0]);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("stale"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reinsert_refreshes_entry() {
        let cache = EmbeddingCache::new(2, DEFAULT_TTL);
        cache.insert("a".to_string(), vec![1.0]);
        cache.insert("a".to_string(), vec![9.0]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(vec![9.0]));
    }
}
