//! Duplicate merger (spec §4.E: "Merger").
//!
//! Given a freshly extracted candidate and the top-5 most similar existing
//! memories (by lexical and cosine score), decide whether the candidate
//! should be merged into an existing object instead of created anew.

use crate::extractor::MemoryCandidate;
use crate::memory::types::{Confidence, MemoryObject, ObjectType};

/// Candidates for merge consideration must clear one of these gates
/// (spec §4.E: "lexical>0.5 OR cosine>0.85").
const LEXICAL_THRESHOLD: f32 = 0.5;
const COSINE_THRESHOLD: f32 = 0.85;

/// One existing memory, scored against the new candidate by both signals.
#[derive(Debug, Clone)]
pub struct SimilarMatch {
    pub object: MemoryObject,
    pub lexical_score: f32,
    pub cosine_score: f32,
}

impl SimilarMatch {
    fn clears_merge_gate(&self) -> bool {
        self.lexical_score > LEXICAL_THRESHOLD || self.cosine_score > COSINE_THRESHOLD
    }
}

/// Result of running a candidate through the merger.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// No existing memory was similar enough; create the candidate as new.
    New(MemoryCandidate),
    /// Fold the candidate into an existing memory rather than creating a
    /// new row.
    MergeInto {
        existing_id: String,
        merged_type: ObjectType,
        merged_confidence: Confidence,
        merged_evidence_event_ids: Vec<String>,
    },
}

/// Majority-vote object type across the candidate and every match that
/// cleared the merge gate; ties broken by [`ObjectType::TIE_BREAK_ORDER`].
fn majority_type(candidate_type: ObjectType, matches: &[&SimilarMatch]) -> ObjectType {
    let mut counts: Vec<(ObjectType, usize)> = Vec::new();
    let mut tally = |t: ObjectType| {
        if let Some(entry) = counts.iter_mut().find(|(ty, _)| *ty == t) {
            entry.1 += 1;
        } else {
            counts.push((t, 1));
        }
    };
    tally(candidate_type);
    for m in matches {
        tally(m.object.object_type);
    }

    ObjectType::TIE_BREAK_ORDER
        .into_iter()
        .filter_map(|t| counts.iter().find(|(ty, _)| *ty == t).map(|(_, c)| (t, *c)))
        .max_by_key(|(_, c)| *c)
        .map(|(t, _)| t)
        .unwrap_or(candidate_type)
}

/// Given similar matches already sorted best-first (at most top-5, per
/// spec §4.E), decide whether to merge or create new.
pub fn merge_candidates(candidate: &MemoryCandidate, similar: &[SimilarMatch]) -> MergeOutcome {
    let eligible: Vec<&SimilarMatch> = similar.iter().filter(|m| m.clears_merge_gate()).collect();

    let Some(best) = eligible.first() else {
        return MergeOutcome::New(candidate.clone());
    };

    let merged_type = majority_type(candidate.suggested_type, &eligible);

    let mut merged_confidence = candidate.confidence;
    for m in &eligible {
        if m.object.confidence.rank() > merged_confidence.rank() {
            merged_confidence = m.object.confidence;
        }
    }

    let mut merged_evidence_event_ids = candidate.evidence_event_ids.clone();
    for m in &eligible {
        for event_id in &m.object.evidence_event_ids {
            if !merged_evidence_event_ids.contains(event_id) {
                merged_evidence_event_ids.push(event_id.clone());
            }
        }
    }

    MergeOutcome::MergeInto {
        existing_id: best.object.id.clone(),
        merged_type,
        merged_confidence,
        merged_evidence_event_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::CreateMemoryInput;
    use crate::memory::types::Status;
    use crate::storage::Storage;

    fn candidate() -> MemoryCandidate {
        MemoryCandidate {
            content: "Always run migrations before deploy".into(),
            suggested_type: ObjectType::Convention,
            evidence_event_ids: vec!["ev-new".into()],
            evidence_excerpt: "Always run migrations before deploy".into(),
            confidence: Confidence::Medium,
        }
    }

    fn existing(storage: &Storage, object_type: ObjectType, confidence: Confidence) -> MemoryObject {
        storage
            .create_memory(CreateMemoryInput {
                content: "Run migrations before deploying".into(),
                object_type,
                confidence,
                evidence_event_ids: vec!["ev-old".into()],
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn below_threshold_creates_new() {
        let storage = Storage::open_in_memory().unwrap();
        let object = existing(&storage, ObjectType::Convention, Confidence::Low);
        let similar = vec![SimilarMatch { object, lexical_score: 0.1, cosine_score: 0.2 }];
        assert!(matches!(merge_candidates(&candidate(), &similar), MergeOutcome::New(_)));
    }

    #[test]
    fn above_cosine_threshold_merges_and_unions_evidence() {
        let storage = Storage::open_in_memory().unwrap();
        let object = existing(&storage, ObjectType::Convention, Confidence::High);
        let existing_id = object.id.clone();
        let similar = vec![SimilarMatch { object, lexical_score: 0.0, cosine_score: 0.9 }];

        match merge_candidates(&candidate(), &similar) {
            MergeOutcome::MergeInto { existing_id: id, merged_confidence, merged_evidence_event_ids, .. } => {
                assert_eq!(id, existing_id);
                assert_eq!(merged_confidence, Confidence::High);
                assert!(merged_evidence_event_ids.contains(&"ev-new".to_string()));
                assert!(merged_evidence_event_ids.contains(&"ev-old".to_string()));
            }
            MergeOutcome::New(_) => panic!("expected merge"),
        }
    }

    #[test]
    fn retired_match_still_eligible_by_score() {
        let storage = Storage::open_in_memory().unwrap();
        let object = existing(&storage, ObjectType::Convention, Confidence::Low);
        storage.retire_memory(&object.id).unwrap();
        let object = storage.get_memory(&object.id).unwrap().unwrap();
        assert_eq!(object.status, Status::Retired);
        let similar = vec![SimilarMatch { object, lexical_score: 0.6, cosine_score: 0.0 }];
        assert!(matches!(merge_candidates(&candidate(), &similar), MergeOutcome::MergeInto { .. }));
    }
}
