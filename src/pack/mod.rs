//! Progressive disclosure pack compiler (spec §4.J) and context-pack output
//! formats / import-export envelope (spec §6).

mod compiler;
mod format;

pub use compiler::{
    compile_pack, resolve_priority_id, ContextPack, PackRequest, PreviousSessionSummary,
    RevalidationAction, RevalidationPrompt, TierCounts,
};
pub use format::{export_memories, import_memories, render, render_json, render_text, render_yaml, ExportEnvelope, ExportedObject, PackFormat};
