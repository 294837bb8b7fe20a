//! Candidate extractor (spec §4.C).
//!
//! Pure and deterministic: splits event content into segments, scores each
//! segment against a built-in per-type regex table, and emits deduplicated
//! [`MemoryCandidate`] values. Never calls external services.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::memory::types::{Confidence, ObjectType};

/// Segments shorter than this are dropped before scoring (spec §4.C step 1).
const MIN_SEGMENT_LEN: usize = 10;

/// Canonical-form cap (spec §4.C step 4).
const MAX_CANONICAL_LEN: usize = 500;

/// Prefix length used for shingle-based dedup (spec §4.C step 5).
const SHINGLE_LEN: usize = 50;

/// A deduplicated extraction result, ready for the reviewer pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCandidate {
    pub content: String,
    pub suggested_type: ObjectType,
    pub evidence_event_ids: Vec<String>,
    pub evidence_excerpt: String,
    pub confidence: Confidence,
}

struct TypePatterns {
    object_type: ObjectType,
    patterns: &'static [&'static Lazy<Regex>],
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).expect("valid built-in pattern"));
    };
}

// failed_attempt
pattern!(FA_TRIED, r"(?i)\b(tried|attempted|went with)\b.{0,40}\b(but|however|didn't work|failed)\b");
pattern!(FA_DOESNT_WORK, r"(?i)\bdoes(n't| not)\s+work\b");
pattern!(FA_GAVE_UP, r"(?i)\b(gave up on|abandoned|backed out of)\b");

// known_fix
pattern!(KF_FIX, r"(?i)\b(fix(ed)?|resolved|solved|the fix is)\b");
pattern!(KF_ROOT_CAUSE, r"(?i)\broot cause\b.{0,40}\bwas\b");
pattern!(KF_WORKAROUND, r"(?i)\bworkaround\b");

// constraint
pattern!(CN_MUST, r"(?i)\b(must|never|always|required to|shall)\b");
pattern!(CN_CANNOT, r"(?i)\b(cannot|can't|not allowed to)\b");

// decision
pattern!(DC_DECIDED, r"(?i)\b(decided to|we will|we're going with|chose to|opted for)\b");
pattern!(DC_INSTEAD_OF, r"(?i)\binstead of\b");

// convention
pattern!(CV_STYLE, r"(?i)\b(convention|style guide|naming convention|prefer(red)? style)\b");
pattern!(CV_ALWAYS_USE, r"(?i)\balways use\b");

// preference
pattern!(PF_PREFER, r"(?i)\b(prefer|would rather|i like|i'd rather)\b");
pattern!(PF_PLEASE, r"(?i)\bplease (use|avoid|don't)\b");

// environment
pattern!(EN_VERSION, r"(?i)\b(version|node|python|rustc|cargo|npm)\s+v?\d+(\.\d+)*");
pattern!(EN_ENV_VAR, r"(?i)\b[A-Z][A-Z0-9_]{3,}\s*=");
pattern!(EN_RUNNING_ON, r"(?i)\brunning on\b");

static FAILED_ATTEMPT_PATTERNS: &[&Lazy<Regex>] = &[&FA_TRIED, &FA_DOESNT_WORK, &FA_GAVE_UP];
static KNOWN_FIX_PATTERNS: &[&Lazy<Regex>] = &[&KF_FIX, &KF_ROOT_CAUSE, &KF_WORKAROUND];
static CONSTRAINT_PATTERNS: &[&Lazy<Regex>] = &[&CN_MUST, &CN_CANNOT];
static DECISION_PATTERNS: &[&Lazy<Regex>] = &[&DC_DECIDED, &DC_INSTEAD_OF];
static CONVENTION_PATTERNS: &[&Lazy<Regex>] = &[&CV_STYLE, &CV_ALWAYS_USE];
static PREFERENCE_PATTERNS: &[&Lazy<Regex>] = &[&PF_PREFER, &PF_PLEASE];
static ENVIRONMENT_PATTERNS: &[&Lazy<Regex>] = &[&EN_VERSION, &EN_ENV_VAR, &EN_RUNNING_ON];

static TYPE_TABLE: Lazy<[TypePatterns; 7]> = Lazy::new(|| {
    [
        TypePatterns { object_type: ObjectType::FailedAttempt, patterns: FAILED_ATTEMPT_PATTERNS },
        TypePatterns { object_type: ObjectType::KnownFix, patterns: KNOWN_FIX_PATTERNS },
        TypePatterns { object_type: ObjectType::Constraint, patterns: CONSTRAINT_PATTERNS },
        TypePatterns { object_type: ObjectType::Decision, patterns: DECISION_PATTERNS },
        TypePatterns { object_type: ObjectType::Convention, patterns: CONVENTION_PATTERNS },
        TypePatterns { object_type: ObjectType::Preference, patterns: PREFERENCE_PATTERNS },
        TypePatterns { object_type: ObjectType::Environment, patterns: ENVIRONMENT_PATTERNS },
    ]
});

static FENCED_CODE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Split `content` into sentence/line segments of at least [`MIN_SEGMENT_LEN`]
/// characters (spec §4.C step 1).
fn split_segments(content: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for line in content.lines() {
        for sentence in line.split(['.', '!', '?']) {
            let trimmed = sentence.trim();
            if trimmed.chars().count() >= MIN_SEGMENT_LEN {
                segments.push(trimmed.to_string());
            }
        }
    }
    segments
}

/// Count regex matches for a segment against one type's pattern table.
fn match_count(segment: &str, patterns: &[&Lazy<Regex>]) -> usize {
    patterns.iter().filter(|re| re.is_match(segment)).count()
}

/// Highest-scoring type for a segment, broken by [`ObjectType::TIE_BREAK_ORDER`]
/// (spec §4.C step 2). Returns `None` if no pattern matched.
fn classify_segment(segment: &str) -> Option<(ObjectType, usize)> {
    let mut best: Option<(ObjectType, usize)> = None;
    for type_patterns in TYPE_TABLE.iter() {
        let count = match_count(segment, type_patterns.patterns);
        if count == 0 {
            continue;
        }
        match best {
            None => best = Some((type_patterns.object_type, count)),
            Some((_, best_count)) if count > best_count => {
                best = Some((type_patterns.object_type, count));
            }
            _ => {}
        }
    }
    // Re-resolve ties using the fixed priority order, since the scan above
    // already visits types in priority order and only replaces on strict
    // improvement, the first equal-or-better match already wins.
    best
}

/// Confidence from capped match count (spec §4.C step 3).
fn confidence_from_count(count: usize) -> Confidence {
    match count.min(3) {
        1 => Confidence::Low,
        2 => Confidence::Medium,
        _ => Confidence::High,
    }
}

/// Canonicalise a matched segment (spec §4.C step 4).
fn canonicalize(segment: &str) -> String {
    let no_code = FENCED_CODE_BLOCK.replace_all(segment, "[code block]");
    let collapsed = WHITESPACE.replace_all(no_code.trim(), " ");
    let collapsed = collapsed.to_string();
    if collapsed.chars().count() > MAX_CANONICAL_LEN {
        collapsed.chars().take(MAX_CANONICAL_LEN).collect()
    } else {
        collapsed
    }
}

/// Shingle key used for dedup (spec §4.C step 5): first 50 normalised chars,
/// lowercased.
fn shingle(canonical: &str) -> String {
    canonical.to_lowercase().chars().take(SHINGLE_LEN).collect()
}

/// Extract deduplicated candidates from a single event's content.
pub fn extract(content: &str, event_id: &str) -> Vec<MemoryCandidate> {
    extract_batch(&[(event_id, content)])
}

/// Extract deduplicated candidates from a batch of events belonging to one
/// session, preserving each candidate's originating event id as evidence.
pub fn extract_batch(events: &[(&str, &str)]) -> Vec<MemoryCandidate> {
    let mut seen_shingles = std::collections::HashSet::new();
    let mut candidates = Vec::new();

    for (event_id, content) in events {
        for segment in split_segments(content) {
            let Some((object_type, count)) = classify_segment(&segment) else {
                continue;
            };
            let canonical = canonicalize(&segment);
            let key = shingle(&canonical);
            if !seen_shingles.insert(key) {
                continue;
            }

            candidates.push(MemoryCandidate {
                content: canonical.clone(),
                suggested_type: object_type,
                evidence_event_ids: vec![event_id.to_string()],
                evidence_excerpt: canonical,
                confidence: confidence_from_count(count),
            });
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_short_segments() {
        let segments = split_segments("ok. This sentence is definitely long enough to keep.");
        assert!(segments.iter().all(|s| s.chars().count() >= MIN_SEGMENT_LEN));
        assert!(!segments.iter().any(|s| s == "ok"));
    }

    #[test]
    fn classifies_known_fix() {
        let candidates = extract("The fix was to add a missing await in the handler.", "ev1");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].suggested_type, ObjectType::KnownFix);
    }

    #[test]
    fn classifies_failed_attempt_over_decision_on_tie_priority() {
        // Matches both a failed_attempt cue and a decision cue; failed_attempt
        // must win on the fixed priority order even if counts tie.
        let candidates = extract(
            "We tried caching the response but it didn't work, so we decided to skip it.",
            "ev1",
        );
        assert_eq!(candidates[0].suggested_type, ObjectType::FailedAttempt);
    }

    #[test]
    fn confidence_scales_with_match_count() {
        assert_eq!(confidence_from_count(1), Confidence::Low);
        assert_eq!(confidence_from_count(2), Confidence::Medium);
        assert_eq!(confidence_from_count(3), Confidence::High);
        assert_eq!(confidence_from_count(10), Confidence::High);
    }

    #[test]
    fn canonicalize_strips_code_blocks_and_collapses_whitespace() {
        let segment = "Use   this:\n```\nfn main() {}\n```\ninstead";
        let canonical = canonicalize(segment);
        assert!(canonical.contains("[code block]"));
        assert!(!canonical.contains("  "));
    }

    #[test]
    fn canonicalize_caps_length() {
        let long = "a".repeat(MAX_CANONICAL_LEN + 100);
        assert_eq!(canonicalize(&long).chars().count(), MAX_CANONICAL_LEN);
    }

    #[test]
    fn dedups_by_shingle_across_segments() {
        let candidates = extract_batch(&[
            ("ev1", "We decided to use Postgres instead of MySQL for this service."),
            ("ev2", "We decided to use Postgres instead of MySQL for this service, definitely."),
        ]);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn extractor_is_pure_same_input_same_output() {
        let a = extract("We must never commit secrets to the repository.", "ev1");
        let b = extract("We must never commit secrets to the repository.", "ev1");
        assert_eq!(a, b);
    }
}
