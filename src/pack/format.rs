//! Context-pack output formats and the memory import/export envelope
//! (spec §6: "Context-pack output formats", "Memory import/export").

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::store::CreateMemoryInput;
use crate::memory::types::{Confidence, MemoryObject, ObjectType, ReviewStatus, Scope, Status};
use crate::pack::compiler::{ContextPack, RevalidationAction};
use crate::storage::Storage;

/// Output format for a compiled [`ContextPack`] (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackFormat {
    /// Structured sections; default.
    Yaml,
    /// The pack verbatim.
    Json,
    /// Human-readable, with per-section emoji and a token-usage footer.
    Text,
}

#[derive(Serialize)]
struct YamlItem<'a> {
    #[serde(rename = "type")]
    object_type: &'static str,
    content: &'a str,
    confidence: &'static str,
}

#[derive(Serialize)]
struct YamlRevalidation<'a> {
    id: &'a str,
    content: &'a str,
    action: &'static str,
    reasons: &'a [String],
}

#[derive(Serialize)]
struct YamlDoc<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    needs_revalidation: Option<Vec<YamlRevalidation<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_session: Option<serde_json::Value>,
    constraints: Vec<YamlItem<'a>>,
    relevant_memories: Vec<YamlItem<'a>>,
}

fn yaml_item(object: &MemoryObject) -> YamlItem<'_> {
    YamlItem { object_type: object.object_type.as_str(), content: &object.content, confidence: object.confidence.as_str() }
}

/// Render a pack as the default YAML document (spec §6).
pub fn render_yaml(pack: &ContextPack) -> String {
    let needs_revalidation = if pack.revalidation_prompts.is_empty() {
        None
    } else {
        Some(
            pack.revalidation_prompts
                .iter()
                .map(|p| YamlRevalidation {
                    id: &p.short_id,
                    content: &p.content_preview,
                    action: match p.action {
                        RevalidationAction::Retire => "retire",
                        RevalidationAction::Verify => "verify",
                    },
                    reasons: &p.reasons,
                })
                .collect(),
        )
    };

    let previous_session = pack.previous_session.as_ref().map(|s| {
        serde_json::json!({
            "summary": s.summary,
            "workingFile": s.working_file,
            "workingTask": s.working_task,
        })
    });

    let doc = YamlDoc {
        needs_revalidation,
        previous_session,
        constraints: pack.constraints.iter().map(yaml_item).collect(),
        relevant_memories: pack.relevant_objects.iter().map(yaml_item).collect(),
    };

    serde_yaml::to_string(&doc).unwrap_or_else(|_| "{}".into())
}

/// Render a pack as JSON — the structured object verbatim (spec §6).
pub fn render_json(pack: &ContextPack) -> String {
    let value = serde_json::json!({
        "level": level_str(pack.level),
        "tokensUsed": pack.tokens_used,
        "tokenBudget": pack.token_budget,
        "tierCounts": {
            "constraints": pack.tier_counts.constraints,
            "warnings": pack.tier_counts.warnings,
            "priority": pack.tier_counts.priority,
            "queryResults": pack.tier_counts.query_results,
            "related": pack.tier_counts.related,
            "history": pack.tier_counts.history,
        },
        "memories": pack.memories,
        "overflowCount": pack.overflow_count,
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".into())
}

fn level_str(level: crate::memory::session::DisclosureLevel) -> &'static str {
    level.as_str()
}

fn emoji_for(object_type: ObjectType) -> &'static str {
    match object_type {
        ObjectType::Decision => "\u{1F9E9}",
        ObjectType::Preference => "\u{2764}",
        ObjectType::Convention => "\u{1F4CF}",
        ObjectType::KnownFix => "\u{1F527}",
        ObjectType::Constraint => "\u{1F6A7}",
        ObjectType::FailedAttempt => "\u{26A0}",
        ObjectType::Environment => "\u{1F5A5}",
    }
}

/// Render a pack as human-readable text with a token-usage footer
/// (spec §6).
pub fn render_text(pack: &ContextPack) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Context pack ({})\n\n", level_str(pack.level)));

    if !pack.constraints.is_empty() {
        out.push_str("## Constraints\n");
        for c in &pack.constraints {
            out.push_str(&format!("{} {}\n", emoji_for(c.object_type), c.content));
        }
        out.push('\n');
    }

    let non_constraints: Vec<&MemoryObject> = pack.memories.iter().filter(|m| m.object_type != ObjectType::Constraint).collect();
    if !non_constraints.is_empty() {
        out.push_str("## Memories\n");
        for m in non_constraints {
            out.push_str(&format!("{} {}\n", emoji_for(m.object_type), m.content));
        }
        out.push('\n');
    }

    if !pack.revalidation_prompts.is_empty() {
        out.push_str("## Needs revalidation\n");
        for p in &pack.revalidation_prompts {
            let action = match p.action {
                RevalidationAction::Retire => "retire",
                RevalidationAction::Verify => "verify",
            };
            out.push_str(&format!("\u{26A0} [{}] {} — {}\n", p.short_id, action, p.content_preview));
        }
        out.push('\n');
    }

    out.push_str(&format!("---\n{}/{} tokens used\n", pack.tokens_used, pack.token_budget));
    out
}

/// Render a pack in the requested format.
pub fn render(pack: &ContextPack, format: PackFormat) -> String {
    match format {
        PackFormat::Yaml => render_yaml(pack),
        PackFormat::Json => render_json(pack),
        PackFormat::Text => render_text(pack),
    }
}

/// One exported memory row (spec §6: "Memory import/export").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedObject {
    pub content: String,
    pub object_type: ObjectType,
    pub scope: Scope,
    pub status: Status,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_excerpt: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The `{version, exportedAt, objects}` envelope (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub version: String,
    pub exported_at: chrono::DateTime<chrono::Utc>,
    pub objects: Vec<ExportedObject>,
}

const EXPORT_VERSION: &str = "1.0.0";

/// Export every non-retired memory as a versioned JSON envelope.
pub fn export_memories(storage: &Storage, exported_at: chrono::DateTime<chrono::Utc>) -> Result<ExportEnvelope> {
    let objects = storage
        .list_memories(None, None)?
        .into_iter()
        .filter(|m| m.status != Status::Retired)
        .map(|m| ExportedObject {
            content: m.content,
            object_type: m.object_type,
            scope: m.scope,
            status: m.status,
            confidence: m.confidence,
            evidence_excerpt: m.evidence_excerpt,
            created_at: m.created_at,
        })
        .collect();

    Ok(ExportEnvelope { version: EXPORT_VERSION.to_string(), exported_at, objects })
}

/// Import an envelope: each row is auto-approved and re-indexed through the
/// normal creation path (spec §6: "Import auto-approves and re-indexes each
/// row").
pub fn import_memories(storage: &Storage, envelope: &ExportEnvelope) -> Result<Vec<MemoryObject>> {
    let mut created = Vec::with_capacity(envelope.objects.len());
    for object in &envelope.objects {
        let row = storage.create_memory(CreateMemoryInput {
            content: object.content.clone(),
            object_type: object.object_type,
            scope: object.scope.clone(),
            confidence: object.confidence,
            evidence_excerpt: object.evidence_excerpt.clone(),
            review_status: ReviewStatus::Approved,
            ..Default::default()
        })?;
        let row = storage.approve_memory(&row.id)?.unwrap_or(row);
        created.push(row);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::session::DisclosureLevel;
    use crate::pack::compiler::{compile_pack, PackRequest};
    use crate::search::vector::VectorBackend;

    fn sample_pack() -> ContextPack {
        let storage = Storage::open_in_memory().unwrap();
        let c = storage
            .create_memory(CreateMemoryInput {
                content: "Always run cargo fmt before committing".into(),
                object_type: ObjectType::Constraint,
                ..Default::default()
            })
            .unwrap();
        storage.approve_memory(&c.id).unwrap();
        let vectors = VectorBackend::new();
        compile_pack(&storage, DisclosureLevel::Minimal, &vectors, &PackRequest::new()).unwrap()
    }

    #[test]
    fn yaml_render_contains_constraints_section() {
        let pack = sample_pack();
        let yaml = render_yaml(&pack);
        assert!(yaml.contains("constraints"));
    }

    #[test]
    fn json_render_is_valid_json() {
        let pack = sample_pack();
        let json = render_json(&pack);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["tokenBudget"].is_number());
    }

    #[test]
    fn text_render_has_token_footer() {
        let pack = sample_pack();
        let text = render_text(&pack);
        assert!(text.contains("tokens used"));
    }

    #[test]
    fn export_then_import_roundtrips_content() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .create_memory(CreateMemoryInput { content: "We decided to use SQLite".into(), object_type: ObjectType::Decision, ..Default::default() })
            .unwrap();

        let envelope = export_memories(&storage, chrono::Utc::now()).unwrap();
        assert_eq!(envelope.version, "1.0.0");

        let other = Storage::open_in_memory().unwrap();
        let imported = import_memories(&other, &envelope).unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].review_status, ReviewStatus::Approved);
    }
}
