//! Conflict queue persistence (spec §4.E).

use rusqlite::{params, OptionalExtension};

use crate::error::{AlexandriaError, Result};
use crate::ids::new_id;
use crate::memory::types::{Conflict, ConflictStatus, ConflictType, Severity, SuggestedResolution};
use crate::storage::Storage;

impl Storage {
    /// Persist a newly surfaced conflict, pending human resolution.
    pub fn create_conflict(
        &self,
        conflict_type: ConflictType,
        severity: Severity,
        new_candidate: String,
        existing_memories: Vec<String>,
        suggested_resolution: SuggestedResolution,
        description: String,
    ) -> Result<Conflict> {
        let conflict = Conflict {
            id: new_id(),
            conflict_type,
            severity,
            new_candidate,
            existing_memories,
            suggested_resolution,
            description,
            status: ConflictStatus::Pending,
            resolved_resolution: None,
            resolved_by: None,
            resolved_at: None,
        };

        self.in_transaction(|conn| {
            conn.execute(
                "INSERT INTO conflicts (id, conflict_type, severity, new_candidate, existing_memories,
                    suggested_resolution, description, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    conflict.id,
                    conflict_type_str(conflict.conflict_type),
                    severity_str(conflict.severity),
                    conflict.new_candidate,
                    serde_json::to_string(&conflict.existing_memories).unwrap_or_else(|_| "[]".into()),
                    resolution_str(conflict.suggested_resolution),
                    conflict.description,
                    "pending",
                ],
            )?;
            Ok(())
        })?;

        Ok(conflict)
    }

    /// Fetch a conflict by id.
    pub fn get_conflict(&self, id: &str) -> Result<Option<Conflict>> {
        self.with_reader(|conn| {
            conn.query_row("SELECT * FROM conflicts WHERE id = ?1", params![id], row_to_conflict)
                .optional()
                .map_err(AlexandriaError::from)
        })
    }

    /// List conflicts still pending human resolution.
    pub fn list_pending_conflicts(&self) -> Result<Vec<Conflict>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM conflicts WHERE status = 'pending' ORDER BY rowid ASC")?;
            let rows = stmt.query_map([], row_to_conflict)?.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Resolve a conflict with the chosen resolution and resolver identity.
    pub fn resolve_conflict_record(&self, id: &str, resolution: SuggestedResolution, resolved_by: &str) -> Result<()> {
        self.in_transaction(|conn| {
            let changed = conn.execute(
                "UPDATE conflicts SET status = 'resolved', resolved_resolution = ?2, resolved_by = ?3,
                    resolved_at = datetime('now') WHERE id = ?1",
                params![id, resolution_str(resolution), resolved_by],
            )?;
            if changed == 0 {
                return Err(AlexandriaError::NotFound(format!("conflict {id} not found")));
            }
            Ok(())
        })
    }
}

fn conflict_type_str(t: ConflictType) -> &'static str {
    match t {
        ConflictType::Contradiction => "contradiction",
        ConflictType::Duplicate => "duplicate",
        ConflictType::Supersession => "supersession",
        ConflictType::Ambiguity => "ambiguity",
    }
}

fn conflict_type_parse(s: &str) -> ConflictType {
    match s {
        "contradiction" => ConflictType::Contradiction,
        "duplicate" => ConflictType::Duplicate,
        "supersession" => ConflictType::Supersession,
        _ => ConflictType::Ambiguity,
    }
}

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
    }
}

fn severity_parse(s: &str) -> Severity {
    match s {
        "high" => Severity::High,
        "medium" => Severity::Medium,
        _ => Severity::Low,
    }
}

fn resolution_str(r: SuggestedResolution) -> &'static str {
    match r {
        SuggestedResolution::KeepExisting => "keep_existing",
        SuggestedResolution::Replace => "replace",
        SuggestedResolution::Merge => "merge",
        SuggestedResolution::KeepBoth => "keep_both",
        SuggestedResolution::RejectBoth => "reject_both",
    }
}

fn resolution_parse(s: &str) -> SuggestedResolution {
    match s {
        "replace" => SuggestedResolution::Replace,
        "merge" => SuggestedResolution::Merge,
        "keep_both" => SuggestedResolution::KeepBoth,
        "reject_both" => SuggestedResolution::RejectBoth,
        _ => SuggestedResolution::KeepExisting,
    }
}

fn row_to_conflict(row: &rusqlite::Row) -> rusqlite::Result<Conflict> {
    let conflict_type: String = row.get("conflict_type")?;
    let severity: String = row.get("severity")?;
    let existing_memories: String = row.get("existing_memories")?;
    let suggested_resolution: String = row.get("suggested_resolution")?;
    let status: String = row.get("status")?;
    let resolved_resolution: Option<String> = row.get("resolved_resolution")?;
    let resolved_at: Option<String> = row.get("resolved_at")?;

    Ok(Conflict {
        id: row.get("id")?,
        conflict_type: conflict_type_parse(&conflict_type),
        severity: severity_parse(&severity),
        new_candidate: row.get("new_candidate")?,
        existing_memories: serde_json::from_str(&existing_memories).unwrap_or_default(),
        suggested_resolution: resolution_parse(&suggested_resolution),
        description: row.get("description")?,
        status: if status == "resolved" { ConflictStatus::Resolved } else { ConflictStatus::Pending },
        resolved_resolution: resolved_resolution.map(|s| resolution_parse(&s)),
        resolved_by: row.get("resolved_by")?,
        resolved_at: resolved_at.map(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now())
        }),
    })
}
