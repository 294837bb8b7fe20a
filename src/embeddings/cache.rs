//! Query embedding cache (spec: "Supplemented features" — LRU query
//! embedding cache). Mirrors the teacher's `query_cache` field on the
//! storage kernel: a small in-memory LRU keyed by the raw query string, so a
//! session that repeats the same search doesn't re-run inference for it.
//! Pure performance; carries no retrieval semantics of its own.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

/// Capacity the teacher uses for its query cache.
pub const DEFAULT_CAPACITY: usize = 100;

/// Thread-safe LRU cache from query string to its embedding vector.
pub struct QueryEmbeddingCache {
    inner: Mutex<LruCache<String, Vec<f32>>>,
}

impl QueryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap());
        Self { inner: Mutex::new(LruCache::new(capacity)) }
    }

    /// Look up a cached embedding, promoting it to most-recently-used.
    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        self.inner.lock().ok()?.get(query).cloned()
    }

    /// Insert or refresh an embedding, evicting the least-recently-used
    /// entry if the cache is at capacity.
    pub fn put(&self, query: &str, embedding: Vec<f32>) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(query.to_string(), embedding);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueryEmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
