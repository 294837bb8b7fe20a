//! Supersession / contradiction analysis (spec §4.E: "Superseder").
//!
//! Runs after the merger has ruled out a duplicate: decides whether a new
//! candidate should replace an existing memory outright (supersession) or
//! merely conflicts with it in a way a human should resolve (contradiction).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extractor::MemoryCandidate;
use crate::memory::types::{MemoryObject, ObjectType};

/// Gate for considering supersession/contradiction at all (spec §4.E:
/// "cosine≥0.8").
const COSINE_GATE: f32 = 0.8;

/// Outcome of analysing one candidate against one existing memory.
#[derive(Debug, Clone, PartialEq)]
pub enum SupersessionVerdict {
    /// Not similar enough to be related.
    NoConflict,
    /// The candidate is a newer statement of the same thing; supersede.
    Supersedes,
    /// The candidate directly contradicts the existing memory; queue for
    /// human review rather than auto-applying either.
    Contradicts,
}

/// Contradiction lexicon (spec §4.E, verbatim).
static CONTRADICTION_LEXICON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(instead|now|actually|no longer|changed|updated|switched|replaced|not anymore|fixed|resolved)\b")
        .expect("valid regex")
});

/// `true` if the candidate's content carries one of the contradiction
/// lexicon's cue words (spec §4.E: "contradiction lexicon present in new").
fn has_contradiction_cue(candidate_content: &str) -> bool {
    CONTRADICTION_LEXICON.is_match(candidate_content)
}

/// Same pattern the extractor uses to spot environment/version mentions
/// (`version|node|python|rustc|cargo|npm v?N(.N)*`), reused here to pull a
/// comparable version number out of two `environment`-typed memories.
static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)*").expect("valid regex"));

fn extract_version(text: &str) -> Option<Vec<u32>> {
    let found = VERSION_PATTERN.find(text)?;
    let parts: Vec<u32> = found.as_str().split('.').filter_map(|p| p.parse().ok()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

/// Analyse one candidate against one existing memory already known to be
/// semantically close (cosine similarity supplied by the caller's vector
/// search). Applies spec §4.E's type-specific supersession rules before
/// falling back to the generic contradiction lexicon.
pub fn analyse_supersession(candidate: &MemoryCandidate, existing: &MemoryObject, cosine_score: f32) -> SupersessionVerdict {
    if cosine_score < COSINE_GATE {
        return SupersessionVerdict::NoConflict;
    }

    // known_fix over failed_attempt on the same topic is always supersession.
    if candidate.suggested_type == ObjectType::KnownFix && existing.object_type == ObjectType::FailedAttempt {
        return SupersessionVerdict::Supersedes;
    }

    // environment entries with a numerically-higher extracted version supersede.
    if candidate.suggested_type == ObjectType::Environment && existing.object_type == ObjectType::Environment {
        if let (Some(new_version), Some(old_version)) =
            (extract_version(&candidate.content), extract_version(&existing.content))
        {
            if new_version > old_version {
                return SupersessionVerdict::Supersedes;
            }
        }
    }

    let contradicts = has_contradiction_cue(&candidate.content);

    // decision+contradiction supersedes prior decision.
    if contradicts && candidate.suggested_type == ObjectType::Decision && existing.object_type == ObjectType::Decision {
        return SupersessionVerdict::Supersedes;
    }

    if contradicts {
        return SupersessionVerdict::Contradicts;
    }

    SupersessionVerdict::NoConflict
}
