//! Storage module (spec §4.A, §4.B, §3)
//!
//! SQLite-based storage layer: schema migrations, the `Storage` connection
//! kernel, and the session/event tables built on top of it. Full-text search
//! over memory objects lives in [`crate::search`], which reads through the
//! same `Storage` handle.

mod conflicts;
mod events;
mod kernel;
mod migrations;
mod sessions;

pub use events::{content_hash, estimate_tokens, EventInput, EventRecord, BLOB_THRESHOLD_BYTES};
pub use kernel::Storage;
pub use migrations::{Migration, MIGRATIONS};
