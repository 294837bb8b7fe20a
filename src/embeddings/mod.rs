//! Semantic Embeddings Module
//!
//! Local embedding generation using fastembed (ONNX-based). No external API
//! calls; 100% on-device. Gated behind the `embeddings` feature — callers
//! that already have an embedding vector (e.g. supplied by the agent host)
//! never need to link this module in.
//!
//! Supports:
//! - Text embedding generation (Nomic Embed Text v1.5, truncated to
//!   [`local::EMBEDDING_DIMENSIONS`] to match the vector index width)
//! - Cosine similarity / Euclidean distance / dot product
//! - Batch embedding for efficiency
//! - An LRU cache over repeated query strings ([`cache::QueryEmbeddingCache`])

mod cache;
mod local;

pub use cache::{QueryEmbeddingCache, DEFAULT_CAPACITY as QUERY_CACHE_CAPACITY};
pub use local::{
    cosine_similarity, dot_product, euclidean_distance, matryoshka_truncate, Embedding,
    EmbeddingError, EmbeddingService, BATCH_SIZE, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH,
};
