//! Dense vector search (spec §4.G step 2, §4.A).
//!
//! Fixed-dimension (384) embeddings. When the `vector-search` feature is
//! compiled in, an HNSW index backs k-NN queries; otherwise the kernel
//! degrades to brute-force cosine comparison in-process, as required by
//! spec §4.A ("where the vector extension is unavailable").

/// Embedding width used throughout this crate (spec §4.A: "fixed-dimension
/// (384) dense-vector virtual table").
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// One vector hit: memory id and cosine similarity in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
}

/// Error surfaced when a k-NN query cannot be served. Callers must degrade
/// gracefully (spec §4.G: "failures degrade gracefully (empty vector list,
/// log `vector_unavailable`)").
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorSearchError {
    #[error("vector backend unavailable: {0}")]
    Unavailable(String),
    #[error("embedding has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 for a
/// zero-length or all-zero vector rather than dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// An in-process, brute-force nearest-neighbour index. Used unconditionally
/// when the `vector-search` feature is off.
#[derive(Debug, Default)]
pub struct BruteForceIndex {
    entries: Vec<(String, Vec<f32>)>,
}

impl BruteForceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, id: impl Into<String>, embedding: Vec<f32>) {
        let id = id.into();
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| existing == &id) {
            entry.1 = embedding;
        } else {
            self.entries.push((id, embedding));
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.entries.retain(|(existing, _)| existing != id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The stored embedding for `id`, if present — used to self-query for
    /// neighbours of an already-known memory.
    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.entries.iter().find(|(existing, _)| existing == id).map(|(_, v)| v.as_slice())
    }

    /// Top-`k` nearest neighbours to `query`, descending similarity.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<VectorHit> {
        let mut scored: Vec<VectorHit> = self
            .entries
            .iter()
            .map(|(id, embedding)| VectorHit {
                id: id.clone(),
                score: cosine_similarity(query, embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

#[cfg(feature = "vector-search")]
mod hnsw {
    use super::{VectorHit, VectorSearchError, EMBEDDING_DIMENSIONS};
    use std::collections::HashMap;
    use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

    /// HNSW-backed vector index, used when the `vector-search` feature is
    /// enabled.
    pub struct HnswIndex {
        index: Index,
        id_to_key: HashMap<String, u64>,
        key_to_id: HashMap<u64, String>,
        embeddings: HashMap<String, Vec<f32>>,
        next_key: u64,
    }

    impl HnswIndex {
        pub fn new() -> Result<Self, VectorSearchError> {
            let options = IndexOptions {
                dimensions: EMBEDDING_DIMENSIONS,
                metric: MetricKind::Cos,
                quantization: ScalarKind::F32,
                connectivity: 16,
                expansion_add: 128,
                expansion_search: 64,
                multi: false,
            };
            let index = Index::new(&options).map_err(|e| VectorSearchError::Unavailable(e.to_string()))?;
            index
                .reserve(1024)
                .map_err(|e| VectorSearchError::Unavailable(e.to_string()))?;
            Ok(Self {
                index,
                id_to_key: HashMap::new(),
                key_to_id: HashMap::new(),
                embeddings: HashMap::new(),
                next_key: 0,
            })
        }

        pub fn upsert(&mut self, id: &str, embedding: &[f32]) -> Result<(), VectorSearchError> {
            if embedding.len() != EMBEDDING_DIMENSIONS {
                return Err(VectorSearchError::DimensionMismatch {
                    expected: EMBEDDING_DIMENSIONS,
                    got: embedding.len(),
                });
            }
            if let Some(&key) = self.id_to_key.get(id) {
                let _ = self.index.remove(key);
                self.key_to_id.remove(&key);
            }
            let key = self.next_key;
            self.next_key += 1;
            self.index
                .add(key, embedding)
                .map_err(|e| VectorSearchError::Unavailable(e.to_string()))?;
            self.id_to_key.insert(id.to_string(), key);
            self.key_to_id.insert(key, id.to_string());
            self.embeddings.insert(id.to_string(), embedding.to_vec());
            Ok(())
        }

        pub fn get(&self, id: &str) -> Option<&[f32]> {
            self.embeddings.get(id).map(|v| v.as_slice())
        }

        pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, VectorSearchError> {
            let matches = self
                .index
                .search(query, k)
                .map_err(|e| VectorSearchError::Unavailable(e.to_string()))?;
            Ok(matches
                .keys
                .iter()
                .zip(matches.distances.iter())
                .filter_map(|(key, distance)| {
                    self.key_to_id.get(key).map(|id| VectorHit {
                        id: id.clone(),
                        score: 1.0 - distance,
                    })
                })
                .collect())
        }
    }
}

#[cfg(feature = "vector-search")]
pub use hnsw::HnswIndex;

/// The active vector backend: HNSW when compiled in, brute-force otherwise.
pub enum VectorBackend {
    #[cfg(feature = "vector-search")]
    Hnsw(hnsw::HnswIndex),
    BruteForce(BruteForceIndex),
}

impl VectorBackend {
    #[cfg(feature = "vector-search")]
    pub fn new() -> Self {
        match hnsw::HnswIndex::new() {
            Ok(index) => VectorBackend::Hnsw(index),
            Err(_) => VectorBackend::BruteForce(BruteForceIndex::new()),
        }
    }

    #[cfg(not(feature = "vector-search"))]
    pub fn new() -> Self {
        VectorBackend::BruteForce(BruteForceIndex::new())
    }

    pub fn upsert(&mut self, id: &str, embedding: &[f32]) {
        match self {
            #[cfg(feature = "vector-search")]
            VectorBackend::Hnsw(index) => {
                if index.upsert(id, embedding).is_err() {
                    tracing::warn!(memory_id = id, "hnsw upsert failed, skipping");
                }
            }
            VectorBackend::BruteForce(index) => index.upsert(id, embedding.to_vec()),
        }
    }

    pub fn search(&self, query: &[f32], k: usize) -> Vec<VectorHit> {
        match self {
            #[cfg(feature = "vector-search")]
            VectorBackend::Hnsw(index) => index.search(query, k).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "vector_unavailable");
                Vec::new()
            }),
            VectorBackend::BruteForce(index) => index.search(query, k),
        }
    }

    /// The stored embedding for `id`, if this backend has seen it before —
    /// used to self-query for neighbours of an already-known memory.
    pub fn get(&self, id: &str) -> Option<&[f32]> {
        match self {
            #[cfg(feature = "vector-search")]
            VectorBackend::Hnsw(index) => index.get(id),
            VectorBackend::BruteForce(index) => index.get(id),
        }
    }
}

impl Default for VectorBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn brute_force_index_ranks_nearest_first() {
        let mut index = BruteForceIndex::new();
        index.upsert("a", vec![1.0, 0.0]);
        index.upsert("b", vec![0.0, 1.0]);
        index.upsert("c", vec![0.9, 0.1]);

        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "c");
    }

    #[test]
    fn brute_force_upsert_replaces_existing_id() {
        let mut index = BruteForceIndex::new();
        index.upsert("a", vec![1.0, 0.0]);
        index.upsert("a", vec![0.0, 1.0]);
        assert_eq!(index.len(), 1);
        let hits = index.search(&[0.0, 1.0], 1);
        assert_eq!(hits[0].id, "a");
    }
}
