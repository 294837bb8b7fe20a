//! Search module (spec §4.G).
//!
//! Two ranking signals — FTS5/BM25 lexical search and dense vector
//! similarity — fused by reciprocal rank fusion. [`crate::reranker`] applies
//! the composite scorer on top of fused hits; [`crate::intent`] builds the
//! `RetrievalPlan` values that `search_with_plan` serves.

mod hybrid;
mod lexical;
mod vector;

pub use hybrid::{reciprocal_rank_fusion, MatchType, SearchHit, DEFAULT_ALPHA, RRF_K};
pub use lexical::{sanitize_fts5_query, LexicalHit};
pub use vector::{cosine_similarity, BruteForceIndex, VectorBackend, VectorHit, VectorSearchError, EMBEDDING_DIMENSIONS};

#[cfg(feature = "vector-search")]
pub use vector::HnswIndex;
