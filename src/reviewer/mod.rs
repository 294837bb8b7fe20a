//! Reviewer pipeline (spec §4.E).
//!
//! Sits between the extractor and the memory store: merges near-duplicate
//! candidates, flags contradictions against existing memories, and queues
//! anything that needs a human decision.

mod merger;
mod queue;
mod superseder;

pub use merger::{merge_candidates, MergeOutcome, SimilarMatch};
pub use queue::{auto_process, build_conflict, resolve_conflict, ProcessOutcome};
pub use superseder::{analyse_supersession, SupersessionVerdict};
