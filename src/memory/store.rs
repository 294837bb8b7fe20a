//! Memory-object store (spec §4.D).
//!
//! Owns all mutation of `memory_objects` rows. Lexical indexing rides on the
//! row write itself via the `memory_fts` triggers installed by the schema
//! migrations; dense-vector indexing is the caller's responsibility — the
//! store only guarantees the `memory_embeddings` row is consistent with the
//! content after the operation commits (spec §4.D: "embedding generation is
//! delegated").

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::{AlexandriaError, Result};
use crate::ids::{new_id, resolve_prefix, PrefixResolution};
use crate::memory::types::{
    CodeReference, Confidence, ConfidenceTier, MemoryObject, ObjectType, ReviewStatus, Scope,
    Status,
};
use crate::storage::Storage;

/// How long a code-reference verification remains "fresh" for the purposes
/// of the grounded confidence tier (spec §4.D: "within 7 days").
fn grounded_freshness() -> Duration {
    Duration::days(7)
}

/// Bounded additive kick applied to `strength` on each access (spec §4.D:
/// "reinforces `strength` with a bounded additive kick").
const ACCESS_REINFORCEMENT: f64 = 0.1;

/// Fields a caller supplies when creating a memory object; everything else
/// (id, timestamps, derived tier) is computed by the store.
#[derive(Debug, Clone)]
pub struct CreateMemoryInput {
    pub content: String,
    pub object_type: ObjectType,
    pub scope: Scope,
    pub confidence: Confidence,
    pub evidence_event_ids: Vec<String>,
    pub evidence_excerpt: Option<String>,
    pub code_refs: Vec<CodeReference>,
    pub review_status: ReviewStatus,
}

impl Default for CreateMemoryInput {
    fn default() -> Self {
        Self {
            content: String::new(),
            object_type: ObjectType::Preference,
            scope: Scope::global(),
            confidence: Confidence::Medium,
            evidence_event_ids: Vec::new(),
            evidence_excerpt: None,
            code_refs: Vec::new(),
            review_status: ReviewStatus::Pending,
        }
    }
}

/// Pure function computing `confidenceTier` from the fields it depends on
/// (spec §4.D creation rule). Must be recomputed on every mutation that
/// touches any of its inputs.
pub fn derive_confidence_tier(
    code_refs: &[CodeReference],
    last_verified_at: Option<DateTime<Utc>>,
    review_status: ReviewStatus,
    evidence_event_ids: &[String],
) -> ConfidenceTier {
    let has_code_refs = !code_refs.is_empty();
    let verified_recently = last_verified_at
        .map(|t| Utc::now().signed_duration_since(t) <= grounded_freshness())
        .unwrap_or(false);

    if has_code_refs && verified_recently {
        return ConfidenceTier::Grounded;
    }
    if review_status == ReviewStatus::Approved || !evidence_event_ids.is_empty() {
        return ConfidenceTier::Observed;
    }
    if has_code_refs || review_status == ReviewStatus::Pending {
        return ConfidenceTier::Inferred;
    }
    ConfidenceTier::Hypothesis
}

impl Storage {
    /// Create a memory object. Empty content is `invalid_content`.
    pub fn create_memory(&self, input: CreateMemoryInput) -> Result<MemoryObject> {
        if input.content.trim().is_empty() {
            return Err(AlexandriaError::InvalidContent("memory content must not be empty".into()));
        }

        let now = Utc::now();
        let tier = derive_confidence_tier(&input.code_refs, None, input.review_status, &input.evidence_event_ids);

        let object = MemoryObject {
            id: new_id(),
            content: input.content,
            object_type: input.object_type,
            scope: input.scope,
            status: Status::Active,
            superseded_by: None,
            confidence: input.confidence,
            confidence_tier: tier,
            evidence_event_ids: input.evidence_event_ids,
            evidence_excerpt: input.evidence_excerpt,
            review_status: input.review_status,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
            access_count: 0,
            last_accessed: None,
            code_refs: input.code_refs,
            last_verified_at: None,
            supersedes: Vec::new(),
            structured: None,
            strength: 1.0,
            last_reinforced_at: None,
            outcome_score: 0.5,
        };

        self.in_transaction(|conn| insert_memory_row(conn, &object))?;
        Ok(object)
    }

    /// Fetch a memory object by exact id or unique prefix (≥ 8 hex chars).
    pub fn get_memory(&self, id_or_prefix: &str) -> Result<Option<MemoryObject>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM memory_objects")?;
            let ids = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let resolved = match resolve_prefix(id_or_prefix, ids.iter().map(String::as_str)) {
                PrefixResolution::Found(id) => id.to_string(),
                PrefixResolution::NotFound | PrefixResolution::TooShort => return Ok(None),
                PrefixResolution::Ambiguous(matches) => {
                    return Err(AlexandriaError::NotFound(format!(
                        "id prefix {id_or_prefix} is ambiguous among {} candidates",
                        matches.len()
                    )))
                }
            };

            conn.query_row("SELECT * FROM memory_objects WHERE id = ?1", params![resolved], row_to_memory)
                .optional()
                .map_err(AlexandriaError::from)
        })
    }

    /// List memory objects matching an optional type and status filter,
    /// newest first.
    pub fn list_memories(&self, object_type: Option<ObjectType>, status: Option<Status>) -> Result<Vec<MemoryObject>> {
        self.with_reader(|conn| {
            let mut sql = String::from("SELECT * FROM memory_objects WHERE 1=1");
            if object_type.is_some() {
                sql.push_str(" AND object_type = ?1");
            }
            if status.is_some() {
                sql.push_str(if object_type.is_some() { " AND status = ?2" } else { " AND status = ?1" });
            }
            sql.push_str(" ORDER BY created_at DESC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = match (object_type, status) {
                (Some(t), Some(s)) => stmt.query_map(params![t.as_str(), s.as_str()], row_to_memory)?.collect::<rusqlite::Result<Vec<_>>>()?,
                (Some(t), None) => stmt.query_map(params![t.as_str()], row_to_memory)?.collect::<rusqlite::Result<Vec<_>>>()?,
                (None, Some(s)) => stmt.query_map(params![s.as_str()], row_to_memory)?.collect::<rusqlite::Result<Vec<_>>>()?,
                (None, None) => stmt.query_map([], row_to_memory)?.collect::<rusqlite::Result<Vec<_>>>()?,
            };
            Ok(rows)
        })
    }

    /// Replace a memory object's content, recomputing its confidence tier.
    /// Returns `Ok(None)` if the id does not exist (caller decides whether
    /// to raise, per spec §4.D edge-case policy).
    pub fn update_memory_content(&self, id: &str, content: String) -> Result<Option<MemoryObject>> {
        if content.trim().is_empty() {
            return Err(AlexandriaError::InvalidContent("memory content must not be empty".into()));
        }

        self.in_transaction(|conn| {
            let Some(mut object) = fetch_memory(conn, id)? else {
                return Ok(None);
            };
            object.content = content;
            object.updated_at = Utc::now();
            object.confidence_tier = derive_confidence_tier(
                &object.code_refs,
                object.last_verified_at,
                object.review_status,
                &object.evidence_event_ids,
            );
            update_memory_row(conn, &object)?;
            Ok(Some(object))
        })
    }

    pub fn approve_memory(&self, id: &str) -> Result<Option<MemoryObject>> {
        self.transition(id, |object| {
            object.review_status = ReviewStatus::Approved;
            object.reviewed_at = Some(Utc::now());
        })
    }

    pub fn reject_memory(&self, id: &str) -> Result<Option<MemoryObject>> {
        self.transition(id, |object| {
            object.review_status = ReviewStatus::Rejected;
            object.reviewed_at = Some(Utc::now());
        })
    }

    /// `reason` is accepted for parity with the spec's signature; the store
    /// does not persist a free-text reason column, only the status change.
    pub fn mark_memory_stale(&self, id: &str, _reason: &str) -> Result<Option<MemoryObject>> {
        self.transition(id, |object| {
            object.status = Status::Stale;
        })
    }

    /// Stamp every code-ref's `verifiedAtCommit` and `lastVerifiedAt`.
    pub fn verify_memory(&self, id: &str, at_commit: &str) -> Result<Option<MemoryObject>> {
        self.transition(id, |object| {
            for code_ref in &mut object.code_refs {
                code_ref.verified_at_commit = Some(at_commit.to_string());
            }
            object.last_verified_at = Some(Utc::now());
            if object.status == Status::Stale {
                object.status = Status::Active;
            }
        })
    }

    /// Idempotent: retiring an already-retired row is a no-op success.
    pub fn retire_memory(&self, id: &str) -> Result<Option<MemoryObject>> {
        self.transition(id, |object| {
            object.status = Status::Retired;
        })
    }

    /// Supersede `old_id` with `new_id`. Refuses to create a cycle by
    /// walking the `supersededBy` chain from `new_id` back towards `old_id`.
    pub fn supersede_memory(&self, old_id: &str, new_id: &str) -> Result<()> {
        self.in_transaction(|conn| {
            let Some(_) = fetch_memory(conn, old_id)? else {
                return Err(AlexandriaError::NotFound(format!("memory {old_id} not found")));
            };
            let Some(mut new_object) = fetch_memory(conn, new_id)? else {
                return Err(AlexandriaError::NotFound(format!("memory {new_id} not found")));
            };

            let mut cursor = Some(new_id.to_string());
            while let Some(current) = cursor {
                if current == old_id {
                    return Err(AlexandriaError::CycleDetected(format!(
                        "supersede({old_id}, {new_id}) would create a cycle"
                    )));
                }
                cursor = fetch_memory(conn, &current)?.and_then(|o| o.superseded_by);
            }

            let mut old_object = fetch_memory(conn, old_id)?.expect("checked above");
            old_object.status = Status::Superseded;
            old_object.superseded_by = Some(new_id.to_string());
            update_memory_row(conn, &old_object)?;

            if !new_object.supersedes.iter().any(|s| s == old_id) {
                new_object.supersedes.push(old_id.to_string());
            }
            update_memory_row(conn, &new_object)?;
            Ok(())
        })
    }

    /// Fold a merged candidate's type/confidence/evidence into an existing
    /// memory object, used by the reviewer's merger instead of creating a
    /// duplicate row (spec §4.E).
    pub fn apply_merge(
        &self,
        id: &str,
        object_type: ObjectType,
        confidence: Confidence,
        evidence_event_ids: Vec<String>,
    ) -> Result<Option<MemoryObject>> {
        self.transition(id, |object| {
            object.object_type = object_type;
            if confidence.rank() > object.confidence.rank() {
                object.confidence = confidence;
            }
            for event_id in evidence_event_ids {
                if !object.evidence_event_ids.contains(&event_id) {
                    object.evidence_event_ids.push(event_id);
                }
            }
        })
    }

    /// Increment access accounting and reinforce `strength` (spec §4.D).
    pub fn record_memory_access(&self, id: &str) -> Result<Option<MemoryObject>> {
        self.transition(id, |object| {
            object.access_count += 1;
            object.last_accessed = Some(Utc::now());
            object.strength = (object.strength + ACCESS_REINFORCEMENT).min(1.0);
            object.last_reinforced_at = Some(Utc::now());
        })
    }

    /// Top-`limit` most-accessed active memories, descending by access
    /// count (supplemented feature: feeds the pack compiler's "priority
    /// (hot) memories" input, spec §4.J step 3, where spec.md leaves the
    /// heatmap itself caller-supplied).
    pub fn access_heatmap(&self, limit: u32) -> Result<Vec<MemoryObject>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM memory_objects WHERE status = ?1 AND access_count > 0
                 ORDER BY access_count DESC, last_accessed DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![Status::Active.as_str(), limit], row_to_memory)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn transition(&self, id: &str, f: impl FnOnce(&mut MemoryObject)) -> Result<Option<MemoryObject>> {
        self.in_transaction(|conn| {
            let Some(mut object) = fetch_memory(conn, id)? else {
                return Ok(None);
            };
            f(&mut object);
            object.updated_at = Utc::now();
            object.confidence_tier = derive_confidence_tier(
                &object.code_refs,
                object.last_verified_at,
                object.review_status,
                &object.evidence_event_ids,
            );
            update_memory_row(conn, &object)?;
            Ok(Some(object))
        })
    }
}

fn fetch_memory(conn: &rusqlite::Connection, id: &str) -> Result<Option<MemoryObject>> {
    conn.query_row("SELECT * FROM memory_objects WHERE id = ?1", params![id], row_to_memory)
        .optional()
        .map_err(AlexandriaError::from)
}

fn insert_memory_row(conn: &rusqlite::Connection, object: &MemoryObject) -> Result<()> {
    let boxed = memory_row_params(object);
    let refs: Vec<&dyn rusqlite::ToSql> = boxed.iter().map(|b| b.as_ref()).collect();
    conn.execute(
        "INSERT INTO memory_objects (
            id, content, object_type, scope_type, scope_path, status, superseded_by,
            confidence, confidence_tier, evidence_event_ids, evidence_excerpt,
            review_status, reviewed_at, created_at, updated_at, access_count,
            last_accessed, code_refs, last_verified_at, supersedes, structured,
            strength, last_reinforced_at, outcome_score
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                  ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
        refs.as_slice(),
    )?;
    Ok(())
}

fn update_memory_row(conn: &rusqlite::Connection, object: &MemoryObject) -> Result<()> {
    let boxed = memory_row_params(object);
    let refs: Vec<&dyn rusqlite::ToSql> = boxed.iter().map(|b| b.as_ref()).collect();
    let changed = conn.execute(
        "UPDATE memory_objects SET
            content = ?2, object_type = ?3, scope_type = ?4, scope_path = ?5, status = ?6,
            superseded_by = ?7, confidence = ?8, confidence_tier = ?9, evidence_event_ids = ?10,
            evidence_excerpt = ?11, review_status = ?12, reviewed_at = ?13, updated_at = ?15,
            access_count = ?16, last_accessed = ?17, code_refs = ?18, last_verified_at = ?19,
            supersedes = ?20, structured = ?21, strength = ?22, last_reinforced_at = ?23,
            outcome_score = ?24
         WHERE id = ?1",
        refs.as_slice(),
    )?;
    if changed == 0 {
        return Err(AlexandriaError::NotFound(format!("memory {} not found", object.id)));
    }
    Ok(())
}

fn memory_row_params(object: &MemoryObject) -> Vec<Box<dyn rusqlite::ToSql>> {
    vec![
        Box::new(object.id.clone()),
        Box::new(object.content.clone()),
        Box::new(object.object_type.as_str()),
        Box::new(object.scope.scope_type.as_str()),
        Box::new(object.scope.path.clone()),
        Box::new(object.status.as_str()),
        Box::new(object.superseded_by.clone()),
        Box::new(object.confidence.as_str()),
        Box::new(object.confidence_tier.as_str()),
        Box::new(serde_json::to_string(&object.evidence_event_ids).unwrap_or_else(|_| "[]".into())),
        Box::new(object.evidence_excerpt.clone()),
        Box::new(object.review_status.as_str()),
        Box::new(object.reviewed_at.map(|t| t.to_rfc3339())),
        Box::new(object.created_at.to_rfc3339()),
        Box::new(object.updated_at.to_rfc3339()),
        Box::new(object.access_count),
        Box::new(object.last_accessed.map(|t| t.to_rfc3339())),
        Box::new(serde_json::to_string(&object.code_refs).unwrap_or_else(|_| "[]".into())),
        Box::new(object.last_verified_at.map(|t| t.to_rfc3339())),
        Box::new(serde_json::to_string(&object.supersedes).unwrap_or_else(|_| "[]".into())),
        Box::new(object.structured.as_ref().and_then(|s| serde_json::to_string(s).ok())),
        Box::new(object.strength),
        Box::new(object.last_reinforced_at.map(|t| t.to_rfc3339())),
        Box::new(object.outcome_score),
    ]
}

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<MemoryObject> {
    let object_type: String = row.get("object_type")?;
    let scope_type: String = row.get("scope_type")?;
    let status: String = row.get("status")?;
    let confidence: String = row.get("confidence")?;
    let confidence_tier: String = row.get("confidence_tier")?;
    let review_status: String = row.get("review_status")?;
    let evidence_json: String = row.get("evidence_event_ids")?;
    let code_refs_json: String = row.get("code_refs")?;
    let supersedes_json: String = row.get("supersedes")?;
    let structured_json: Option<String> = row.get("structured")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let reviewed_at: Option<String> = row.get("reviewed_at")?;
    let last_accessed: Option<String> = row.get("last_accessed")?;
    let last_verified_at: Option<String> = row.get("last_verified_at")?;
    let last_reinforced_at: Option<String> = row.get("last_reinforced_at")?;

    Ok(MemoryObject {
        id: row.get("id")?,
        content: row.get("content")?,
        object_type: ObjectType::parse(&object_type).unwrap_or(ObjectType::Preference),
        scope: Scope {
            scope_type: crate::memory::types::ScopeType::parse(&scope_type)
                .unwrap_or(crate::memory::types::ScopeType::Global),
            path: row.get("scope_path")?,
        },
        status: Status::parse(&status).unwrap_or(Status::Active),
        superseded_by: row.get("superseded_by")?,
        confidence: Confidence::parse(&confidence).unwrap_or(Confidence::Medium),
        confidence_tier: ConfidenceTier::parse(&confidence_tier).unwrap_or(ConfidenceTier::Hypothesis),
        // Tolerant JSON fallback: malformed columns never crash a read.
        evidence_event_ids: serde_json::from_str(&evidence_json).unwrap_or_default(),
        evidence_excerpt: row.get("evidence_excerpt")?,
        review_status: ReviewStatus::parse(&review_status).unwrap_or(ReviewStatus::Pending),
        reviewed_at: reviewed_at.map(|s| parse_dt(&s)),
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
        access_count: row.get("access_count")?,
        last_accessed: last_accessed.map(|s| parse_dt(&s)),
        code_refs: serde_json::from_str(&code_refs_json).unwrap_or_default(),
        last_verified_at: last_verified_at.map(|s| parse_dt(&s)),
        supersedes: serde_json::from_str(&supersedes_json).unwrap_or_default(),
        structured: structured_json.and_then(|s| serde_json::from_str(&s).ok()),
        strength: row.get("strength")?,
        last_reinforced_at: last_reinforced_at.map(|s| parse_dt(&s)),
        outcome_score: row.get("outcome_score")?,
    })
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CreateMemoryInput {
        CreateMemoryInput {
            content: "Use tabs for indentation in this repo".into(),
            object_type: ObjectType::Convention,
            ..Default::default()
        }
    }

    #[test]
    fn create_rejects_empty_content() {
        let storage = Storage::open_in_memory().unwrap();
        let result = storage.create_memory(CreateMemoryInput { content: "   ".into(), ..Default::default() });
        assert!(matches!(result, Err(AlexandriaError::InvalidContent(_))));
    }

    #[test]
    fn create_and_get_by_exact_id() {
        let storage = Storage::open_in_memory().unwrap();
        let object = storage.create_memory(sample()).unwrap();
        let fetched = storage.get_memory(&object.id).unwrap().unwrap();
        assert_eq!(fetched.content, object.content);
        assert_eq!(fetched.confidence_tier, ConfidenceTier::Inferred); // pending review, no code refs
    }

    #[test]
    fn get_by_unique_prefix() {
        let storage = Storage::open_in_memory().unwrap();
        let object = storage.create_memory(sample()).unwrap();
        let prefix = &object.id[..8];
        let fetched = storage.get_memory(prefix).unwrap().unwrap();
        assert_eq!(fetched.id, object.id);
    }

    #[test]
    fn approve_updates_review_status_and_tier() {
        let storage = Storage::open_in_memory().unwrap();
        let object = storage.create_memory(sample()).unwrap();
        let approved = storage.approve_memory(&object.id).unwrap().unwrap();
        assert_eq!(approved.review_status, ReviewStatus::Approved);
        assert_eq!(approved.confidence_tier, ConfidenceTier::Observed);
    }

    #[test]
    fn retire_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        let object = storage.create_memory(sample()).unwrap();
        storage.retire_memory(&object.id).unwrap();
        let second = storage.retire_memory(&object.id).unwrap().unwrap();
        assert_eq!(second.status, Status::Retired);
        assert!(!second.is_default_visible());
    }

    #[test]
    fn supersede_chain_resolves_to_final_active() {
        let storage = Storage::open_in_memory().unwrap();
        let a = storage.create_memory(sample()).unwrap();
        let b = storage.create_memory(sample()).unwrap();
        let c = storage.create_memory(sample()).unwrap();

        storage.supersede_memory(&a.id, &b.id).unwrap();
        storage.supersede_memory(&b.id, &c.id).unwrap();

        let a = storage.get_memory(&a.id).unwrap().unwrap();
        let b = storage.get_memory(&b.id).unwrap().unwrap();
        assert_eq!(a.status, Status::Superseded);
        assert_eq!(a.superseded_by.as_deref(), Some(b.id.as_str()));
        assert_eq!(b.status, Status::Superseded);
        assert_eq!(b.superseded_by.as_deref(), Some(c.id.as_str()));
    }

    #[test]
    fn supersede_refuses_cycle() {
        let storage = Storage::open_in_memory().unwrap();
        let a = storage.create_memory(sample()).unwrap();
        let b = storage.create_memory(sample()).unwrap();
        storage.supersede_memory(&a.id, &b.id).unwrap();
        let result = storage.supersede_memory(&b.id, &a.id);
        assert!(matches!(result, Err(AlexandriaError::CycleDetected(_))));
    }

    #[test]
    fn record_access_increments_and_reinforces() {
        let storage = Storage::open_in_memory().unwrap();
        let object = storage.create_memory(sample()).unwrap();
        let after = storage.record_memory_access(&object.id).unwrap().unwrap();
        assert_eq!(after.access_count, 1);
        assert!(after.strength > object.strength);
        assert!(after.last_accessed.is_some());
    }

    #[test]
    fn access_heatmap_ranks_by_access_count_descending() {
        let storage = Storage::open_in_memory().unwrap();
        let cold = storage.create_memory(sample()).unwrap();
        let hot = storage.create_memory(sample()).unwrap();
        storage.record_memory_access(&hot.id).unwrap();
        storage.record_memory_access(&hot.id).unwrap();
        storage.record_memory_access(&cold.id).unwrap();

        let heatmap = storage.access_heatmap(10).unwrap();
        assert_eq!(heatmap[0].id, hot.id);
        assert_eq!(heatmap[1].id, cold.id);
    }

    #[test]
    fn derive_confidence_tier_matches_spec_rules() {
        let fresh = Some(Utc::now());
        let refs = vec![CodeReference::for_file("src/lib.rs")];
        assert_eq!(
            derive_confidence_tier(&refs, fresh, ReviewStatus::Pending, &[]),
            ConfidenceTier::Grounded
        );
        assert_eq!(
            derive_confidence_tier(&[], None, ReviewStatus::Approved, &[]),
            ConfidenceTier::Observed
        );
        assert_eq!(
            derive_confidence_tier(&refs, None, ReviewStatus::Rejected, &[]),
            ConfidenceTier::Inferred
        );
        assert_eq!(
            derive_confidence_tier(&[], None, ReviewStatus::Rejected, &[]),
            ConfidenceTier::Hypothesis
        );
    }
}
