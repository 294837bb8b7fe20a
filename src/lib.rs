//! # Alexandria
//!
//! A local-first memory substrate for coding agents: typed memory objects
//! backed by SQLite, hybrid lexical + dense-vector retrieval, and
//! token-budgeted progressive-disclosure context packs.
//!
//! ## Architecture
//!
//! - [`storage`] — the connection kernel (reader/writer split over a single
//!   SQLite file), schema migrations, the append-only event log and blob
//!   pool, session CRUD, and the conflict queue's persistence.
//! - [`memory`] — the typed [`memory::MemoryObject`] model and the store
//!   that owns all of its mutation; [`memory::Session`] and its
//!   progressive-disclosure bookkeeping.
//! - [`extractor`] — pure, deterministic candidate extraction from raw
//!   event content (regex-scored, deduplicated, never calls out).
//! - [`reviewer`] — merges near-duplicate candidates, flags contradictions
//!   against existing memories, and queues anything a human must decide.
//! - [`search`] — FTS5/BM25 lexical search, dense cosine similarity (HNSW
//!   when the `vector-search` feature is on, brute-force otherwise), and
//!   their reciprocal-rank-fusion.
//! - [`intent`] — classifies a query into one of seven intents and routes
//!   it to a fixed [`intent::RetrievalPlan`].
//! - [`reranker`] — blends the fused search score with type priority,
//!   confidence, recency, and access frequency into one composite score.
//! - [`staleness`] — compares a memory's code references against git
//!   history to decide whether they're still trustworthy.
//! - [`pack`] — compiles token-budgeted, tiered context packs and renders
//!   them to YAML/JSON/text; the memory import/export envelope.
//! - [`project`] — project-root discovery and per-project database path
//!   resolution.
//! - [`config`] — environment-driven runtime configuration.
//! - [`embeddings`] (feature `embeddings`) — local ONNX embedding
//!   generation via fastembed, with an LRU query cache.
//!
//! Nothing in this crate calls an external network service; embedding
//! generation, when enabled, runs entirely on-device.

mod config;
mod error;
mod extractor;
mod ids;
mod intent;
mod project;
mod reranker;
mod staleness;

pub mod memory;
pub mod pack;
pub mod reviewer;
pub mod search;
pub mod storage;

#[cfg(feature = "embeddings")]
pub mod embeddings;

pub use config::Config;
pub use error::{AlexandriaError, Result};
pub use extractor::{extract, extract_batch, MemoryCandidate};
pub use ids::{new_id, resolve_prefix, PrefixResolution, MIN_PREFIX_LEN};
pub use intent::{classify_intent, plan_for, route, Boosts, Intent, RetrievalPlan};
pub use project::{
    discover_project_root, project_keywords, resolve_project, ProjectMeta, GLOBAL_PROJECT_NAME,
};
pub use reranker::{composite_score, rerank, RerankContext, RerankWeights, TaskKind};
pub use staleness::{classify_object, classify_ref, RefStatus, StalenessVerdict};

/// Common imports for applications embedding this crate.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{AlexandriaError, Result};
    pub use crate::extractor::{extract, extract_batch, MemoryCandidate};
    pub use crate::intent::{classify_intent, route, Intent, RetrievalPlan};
    pub use crate::memory::{
        CodeReference, Confidence, ConfidenceTier, CreateMemoryInput, DisclosureLevel,
        MemoryObject, ObjectType, ReviewStatus, Scope, Session, Status,
    };
    pub use crate::pack::{compile_pack, render, ContextPack, PackFormat, PackRequest};
    pub use crate::reranker::{rerank, RerankContext, RerankWeights, TaskKind};
    pub use crate::reviewer::{auto_process, ProcessOutcome};
    pub use crate::search::{reciprocal_rank_fusion, SearchHit, VectorBackend};
    pub use crate::staleness::{classify_object, StalenessVerdict};
    pub use crate::storage::Storage;
}
