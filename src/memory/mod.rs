//! Memory module: the typed object model, sessions, and the store that owns
//! their mutation (spec §3, §4.D).

pub mod session;
pub mod store;
pub mod types;

pub use session::{DisclosureLevel, DisclosureState, Session};
pub use store::{derive_confidence_tier, CreateMemoryInput};
pub use types::{
    CodeReference, CodeRefType, Confidence, ConfidenceTier, Conflict, ConflictStatus,
    ConflictType, MemoryObject, ObjectType, OutcomeKind, OutcomeRecord, ReviewStatus, Scope,
    ScopeType, Severity, Status, Structured, SuggestedResolution,
};
