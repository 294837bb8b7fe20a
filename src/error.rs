//! Crate-wide error type
//!
//! One enum covers every error kind named in the specification's error
//! handling design: storage failures are wrapped infrastructure errors,
//! everything else is a named semantic variant carrying a human-readable
//! reason.

/// Errors produced by the memory substrate.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AlexandriaError {
    /// Underlying SQLite failure. Fatal to the enclosing transaction.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure (db path creation, project discovery, staleness checks).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Empty or otherwise malformed content was rejected at a boundary.
    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// An enum-typed field (objectType, status, confidence, ...) did not
    /// match a known variant.
    #[error("invalid enum value for {field}: {value}")]
    InvalidEnum {
        /// Field name that failed validation.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// An id or id-prefix resolved to zero or more than one row.
    #[error("not found: {0}")]
    NotFound(String),

    /// A supersession edge would create a cycle in the supersession DAG.
    #[error("cycle detected in supersession chain starting at {0}")]
    CycleDetected(String),

    /// The database carries schema columns from a future, unknown migration.
    #[error("schema incompatible: database has unknown columns ({0})")]
    SchemaIncompatible(String),

    /// The vector extension/backend is absent or failed to initialise.
    /// Retrieval degrades to lexical-only; this is a value, not a panic.
    #[error("vector search unavailable: {0}")]
    VectorUnavailable(String),

    /// Staleness could not be determined for a code reference (no commit
    /// stamp, no content hash, or the check timed out). Degrades to
    /// needs_review by policy, never blocks the caller.
    #[error("staleness unknown for reference: {0}")]
    RefUnknown(String),

    /// A token budget could not admit a required item. The caller logs
    /// and counts it in the pack's overflow, it does not abort packing.
    #[error("token budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The reviewer detected a contradiction, duplicate, supersession, or
    /// ambiguity that needs a human decision.
    #[error("conflict detected: {0}")]
    ConflictDetected(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AlexandriaError>;
