//! Review queue (spec §4.E: "ReviewQueue").
//!
//! Ties the merger and superseder together: a candidate that clears both
//! without conflict is auto-applied; anything flagged as a contradiction or
//! an ambiguous near-duplicate is queued for a human to resolve.

use crate::error::Result;
use crate::extractor::MemoryCandidate;
use crate::memory::store::CreateMemoryInput;
use crate::memory::types::{Conflict, ConflictType, MemoryObject, Severity, SuggestedResolution};
use crate::reviewer::merger::{merge_candidates, MergeOutcome, SimilarMatch};
use crate::reviewer::superseder::{analyse_supersession, SupersessionVerdict};
use crate::storage::Storage;

/// What happened to one candidate after a pass through the review queue.
#[derive(Clone)]
pub enum ProcessOutcome {
    Created(MemoryObject),
    MergedInto(MemoryObject),
    Superseded { new: MemoryObject, old_id: String },
    Queued(Conflict),
}

/// Build the conflict record for a candidate the automatic pipeline could
/// not resolve on its own.
pub fn build_conflict(
    candidate: &MemoryCandidate,
    existing_id: &str,
    conflict_type: ConflictType,
    severity: Severity,
    description: String,
) -> Conflict {
    Conflict {
        id: crate::ids::new_id(),
        conflict_type,
        severity,
        new_candidate: candidate.content.clone(),
        existing_memories: vec![existing_id.to_string()],
        suggested_resolution: match conflict_type {
            ConflictType::Contradiction => SuggestedResolution::Replace,
            ConflictType::Duplicate => SuggestedResolution::Merge,
            ConflictType::Supersession => SuggestedResolution::Replace,
            ConflictType::Ambiguity => SuggestedResolution::KeepBoth,
        },
        description,
        status: crate::memory::types::ConflictStatus::Pending,
        resolved_resolution: None,
        resolved_by: None,
        resolved_at: None,
    }
}

/// Run one candidate through merge-then-supersede-then-create, persisting
/// whichever outcome results.
///
/// `merge_matches` are the top-k (≤5) similar existing memories with their
/// lexical/cosine scores (merger gate); `supersede_match` is the single
/// most semantically similar existing memory of the same type, if any
/// (superseder gate). Both are supplied by the caller since they require a
/// live search index this module does not own.
pub fn auto_process(
    storage: &Storage,
    candidate: &MemoryCandidate,
    merge_matches: &[SimilarMatch],
    supersede_match: Option<(&MemoryObject, f32)>,
) -> Result<ProcessOutcome> {
    match merge_candidates(candidate, merge_matches) {
        MergeOutcome::MergeInto { existing_id, merged_type, merged_confidence, merged_evidence_event_ids } => {
            let merged = storage
                .apply_merge(&existing_id, merged_type, merged_confidence, merged_evidence_event_ids)?
                .expect("existing_id came from a live memory fetched this pass");
            return Ok(ProcessOutcome::MergedInto(merged));
        }
        MergeOutcome::New(_) => {}
    }

    if let Some((existing, cosine_score)) = supersede_match {
        match analyse_supersession(candidate, existing, cosine_score) {
            SupersessionVerdict::Supersedes => {
                let new_object = storage.create_memory(CreateMemoryInput {
                    content: candidate.content.clone(),
                    object_type: candidate.suggested_type,
                    evidence_event_ids: candidate.evidence_event_ids.clone(),
                    evidence_excerpt: Some(candidate.evidence_excerpt.clone()),
                    ..Default::default()
                })?;
                storage.supersede_memory(&existing.id, &new_object.id)?;
                return Ok(ProcessOutcome::Superseded { new: new_object, old_id: existing.id.clone() });
            }
            SupersessionVerdict::Contradicts => {
                let conflict = storage.create_conflict(
                    ConflictType::Contradiction,
                    Severity::High,
                    candidate.content.clone(),
                    vec![existing.id.clone()],
                    SuggestedResolution::Replace,
                    format!("candidate contradicts existing memory {}", existing.id),
                )?;
                return Ok(ProcessOutcome::Queued(conflict));
            }
            SupersessionVerdict::NoConflict => {}
        }
    }

    let created = storage.create_memory(CreateMemoryInput {
        content: candidate.content.clone(),
        object_type: candidate.suggested_type,
        evidence_event_ids: candidate.evidence_event_ids.clone(),
        evidence_excerpt: Some(candidate.evidence_excerpt.clone()),
        ..Default::default()
    })?;
    Ok(ProcessOutcome::Created(created))
}

/// Apply a human's chosen resolution to a pending conflict (spec §4.E:
/// "ReviewQueue.resolve"). `keep_existing`/`reject_both` only update the
/// conflict's status; `replace`/`merge`/`keep_both` additionally mutate the
/// referenced memory objects.
pub fn resolve_conflict(
    storage: &Storage,
    conflict: &Conflict,
    resolution: SuggestedResolution,
    candidate: &MemoryCandidate,
    resolved_by: &str,
) -> Result<()> {
    match resolution {
        SuggestedResolution::Replace => {
            let new_object = storage.create_memory(CreateMemoryInput {
                content: candidate.content.clone(),
                object_type: candidate.suggested_type,
                evidence_event_ids: candidate.evidence_event_ids.clone(),
                evidence_excerpt: Some(candidate.evidence_excerpt.clone()),
                ..Default::default()
            })?;
            for existing_id in &conflict.existing_memories {
                storage.supersede_memory(existing_id, &new_object.id)?;
            }
        }
        SuggestedResolution::Merge => {
            if let Some(existing_id) = conflict.existing_memories.first() {
                storage.apply_merge(
                    existing_id,
                    candidate.suggested_type,
                    candidate.confidence,
                    candidate.evidence_event_ids.clone(),
                )?;
            }
        }
        SuggestedResolution::KeepBoth => {
            storage.create_memory(CreateMemoryInput {
                content: candidate.content.clone(),
                object_type: candidate.suggested_type,
                evidence_event_ids: candidate.evidence_event_ids.clone(),
                evidence_excerpt: Some(candidate.evidence_excerpt.clone()),
                ..Default::default()
            })?;
        }
        SuggestedResolution::KeepExisting | SuggestedResolution::RejectBoth => {}
    }

    storage.resolve_conflict_record(&conflict.id, resolution, resolved_by)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{Confidence, ObjectType};

    fn candidate() -> MemoryCandidate {
        MemoryCandidate {
            content: "We decided to use SQLite for storage".into(),
            suggested_type: ObjectType::Decision,
            evidence_event_ids: vec!["ev1".into()],
            evidence_excerpt: "We decided to use SQLite for storage".into(),
            confidence: Confidence::High,
        }
    }

    #[test]
    fn no_matches_creates_new() {
        let storage = Storage::open_in_memory().unwrap();
        let outcome = auto_process(&storage, &candidate(), &[], None).unwrap();
        assert!(matches!(outcome, ProcessOutcome::Created(_)));
    }

    #[test]
    fn contradicting_decision_supersedes_prior_decision() {
        let storage = Storage::open_in_memory().unwrap();
        let existing = storage
            .create_memory(CreateMemoryInput {
                content: "We decided to use Postgres for storage".into(),
                object_type: ObjectType::Decision,
                ..Default::default()
            })
            .unwrap();

        let switched = MemoryCandidate {
            content: "We actually switched to SQLite for storage".into(),
            suggested_type: ObjectType::Decision,
            evidence_event_ids: vec!["ev1".into()],
            evidence_excerpt: "We actually switched to SQLite for storage".into(),
            confidence: Confidence::High,
        };

        let outcome = auto_process(&storage, &switched, &[], Some((&existing, 0.9))).unwrap();
        match outcome {
            ProcessOutcome::Superseded { old_id, .. } => assert_eq!(old_id, existing.id),
            other => panic!("expected supersede, got {other:?}"),
        }
    }

    #[test]
    fn known_fix_over_failed_attempt_auto_supersedes() {
        let storage = Storage::open_in_memory().unwrap();
        let existing = storage
            .create_memory(CreateMemoryInput {
                content: "Tried useCallback but state stays stale".into(),
                object_type: ObjectType::FailedAttempt,
                ..Default::default()
            })
            .unwrap();

        let fix = MemoryCandidate {
            content: "The fix is to memoise with useMemo; now it works".into(),
            suggested_type: ObjectType::KnownFix,
            evidence_event_ids: vec!["ev1".into()],
            evidence_excerpt: "The fix is to memoise with useMemo; now it works".into(),
            confidence: Confidence::High,
        };

        let outcome = auto_process(&storage, &fix, &[], Some((&existing, 0.9))).unwrap();
        match outcome {
            ProcessOutcome::Superseded { old_id, .. } => assert_eq!(old_id, existing.id),
            other => panic!("expected supersede, got {other:?}"),
        }
    }

    #[test]
    fn contradiction_without_type_specific_rule_is_queued_not_applied() {
        let storage = Storage::open_in_memory().unwrap();
        let existing = storage
            .create_memory(CreateMemoryInput {
                content: "Use tabs for indentation".into(),
                object_type: ObjectType::Convention,
                ..Default::default()
            })
            .unwrap();

        let contradicting = MemoryCandidate {
            content: "We now use spaces for indentation instead".into(),
            suggested_type: ObjectType::Convention,
            evidence_event_ids: vec![],
            evidence_excerpt: "We now use spaces for indentation instead".into(),
            confidence: Confidence::Medium,
        };

        let outcome = auto_process(&storage, &contradicting, &[], Some((&existing, 0.9))).unwrap();
        assert!(matches!(outcome, ProcessOutcome::Queued(_)));
        assert_eq!(storage.list_pending_conflicts().unwrap().len(), 1);
    }
}

impl std::fmt::Debug for ProcessOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessOutcome::Created(o) => write!(f, "Created({})", o.id),
            ProcessOutcome::MergedInto(o) => write!(f, "MergedInto({})", o.id),
            ProcessOutcome::Superseded { new, old_id } => write!(f, "Superseded({} -> {})", old_id, new.id),
            ProcessOutcome::Queued(c) => write!(f, "Queued({})", c.id),
        }
    }
}
