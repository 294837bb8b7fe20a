//! Composite reranker (spec §4.H).
//!
//! Takes the fused search score for each hit and blends it with four other
//! signals — type priority, confidence, recency, and access frequency —
//! into one composite score. Weights are configurable per [`TaskKind`] but
//! default to the spec's general-purpose split.

use crate::memory::types::MemoryObject;

/// Weight given to each sub-score. Must not be assumed to sum to 1 by
/// callers that override individual fields, but the defaults do.
#[derive(Debug, Clone, Copy)]
pub struct RerankWeights {
    pub search: f64,
    pub type_priority: f64,
    pub confidence: f64,
    pub recency: f64,
    pub access: f64,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            search: 0.4,
            type_priority: 0.25,
            confidence: 0.15,
            recency: 0.1,
            access: 0.1,
        }
    }
}

/// A retrieval task shape, used to pick a [`RerankWeights`] preset
/// (spec §4.H: "task presets").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Debugging,
    CodeReview,
    Planning,
    General,
}

impl RerankWeights {
    /// Preset weights for a given task shape.
    pub fn for_task(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Debugging => Self {
                search: 0.35,
                type_priority: 0.3,
                confidence: 0.2,
                recency: 0.1,
                access: 0.05,
            },
            TaskKind::CodeReview => Self {
                search: 0.3,
                type_priority: 0.25,
                confidence: 0.3,
                recency: 0.1,
                access: 0.05,
            },
            TaskKind::Planning => Self {
                search: 0.35,
                type_priority: 0.2,
                confidence: 0.15,
                recency: 0.2,
                access: 0.1,
            },
            TaskKind::General => Self::default(),
        }
    }
}

/// Per-type additive boost on top of [`crate::memory::types::ObjectType::fixed_priority`].
#[derive(Debug, Clone, Default)]
pub struct RerankContext {
    pub weights: RerankWeights,
    pub type_boost: f64,
}

/// `typePriority` sub-score (spec §4.H): `(fixedPriority + optionalTypeBoost) / 100`.
fn type_priority_score(object: &MemoryObject, type_boost: f64) -> f64 {
    (object.object_type.fixed_priority() as f64 + type_boost) / 100.0
}

/// `confidence` sub-score (spec §4.H): `max(tierBoost/2, legacyBoost)`.
fn confidence_score(object: &MemoryObject) -> f64 {
    let tier = object.confidence_tier.tier_boost() / 2.0;
    let legacy = (object.confidence.rank() as f64 + 1.0) / 4.0;
    tier.max(legacy)
}

/// `recency` sub-score (spec §4.H): `exp(-daysSinceCreation/30)`.
fn recency_score(object: &MemoryObject, now: chrono::DateTime<chrono::Utc>) -> f64 {
    let days = (now - object.created_at).num_seconds() as f64 / 86_400.0;
    (-days.max(0.0) / 30.0).exp()
}

/// `access` sub-score (spec §4.H): `log1p(accessCount*2) / log1p(10*2)`, clamped to 1.
fn access_score(object: &MemoryObject) -> f64 {
    let numerator = ((object.access_count as f64 * 2.0) + 1.0).ln();
    let denominator = (10.0_f64 * 2.0 + 1.0).ln();
    (numerator / denominator).min(1.0)
}

/// Compute the composite score for one object against its fused search score.
pub fn composite_score(
    object: &MemoryObject,
    search_score: f64,
    ctx: &RerankContext,
    now: chrono::DateTime<chrono::Utc>,
) -> f64 {
    let w = ctx.weights;
    w.search * search_score
        + w.type_priority * type_priority_score(object, ctx.type_boost)
        + w.confidence * confidence_score(object)
        + w.recency * recency_score(object, now)
        + w.access * access_score(object)
}

/// Rerank a set of `(object, searchScore)` pairs by composite score,
/// descending.
pub fn rerank(
    hits: Vec<(MemoryObject, f64)>,
    ctx: &RerankContext,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<(MemoryObject, f64)> {
    let mut scored: Vec<(MemoryObject, f64)> = hits
        .into_iter()
        .map(|(object, search_score)| {
            let composite = composite_score(&object, search_score, ctx, now);
            (object, composite)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::CreateMemoryInput;
    use crate::memory::types::{Confidence, ObjectType};
    use crate::storage::Storage;

    fn make_object(storage: &Storage, object_type: ObjectType, content: &str) -> MemoryObject {
        storage
            .create_memory(CreateMemoryInput {
                content: content.into(),
                object_type,
                confidence: Confidence::High,
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn higher_fixed_priority_type_scores_higher_with_equal_search_score() {
        let storage = Storage::open_in_memory().unwrap();
        let fix = make_object(&storage, ObjectType::KnownFix, "known fix content here");
        let env = make_object(&storage, ObjectType::Environment, "environment content here");
        let ctx = RerankContext::default();
        let now = chrono::Utc::now();

        let fix_score = composite_score(&fix, 0.5, &ctx, now);
        let env_score = composite_score(&env, 0.5, &ctx, now);
        assert!(fix_score > env_score);
    }

    #[test]
    fn recency_score_decays_with_age() {
        let storage = Storage::open_in_memory().unwrap();
        let mut object = make_object(&storage, ObjectType::Decision, "a decision was made here");
        let now = chrono::Utc::now();
        let fresh = recency_score(&object, now);
        object.created_at = now - chrono::Duration::days(60);
        let stale = recency_score(&object, now);
        assert!(fresh > stale);
    }

    #[test]
    fn access_score_clamped_to_one() {
        let storage = Storage::open_in_memory().unwrap();
        let mut object = make_object(&storage, ObjectType::Decision, "a decision was made here");
        object.access_count = 10_000;
        assert!(access_score(&object) <= 1.0);
    }

    #[test]
    fn rerank_sorts_descending_by_composite() {
        let storage = Storage::open_in_memory().unwrap();
        let low = make_object(&storage, ObjectType::Environment, "environment content here");
        let high = make_object(&storage, ObjectType::FailedAttempt, "failed attempt content here");
        let ctx = RerankContext::default();
        let now = chrono::Utc::now();

        let ranked = rerank(vec![(low, 0.2), (high, 0.2)], &ctx, now);
        assert_eq!(ranked[0].0.object_type, ObjectType::FailedAttempt);
    }

    #[test]
    fn task_presets_weight_confidence_higher_for_code_review() {
        let review = RerankWeights::for_task(TaskKind::CodeReview);
        let general = RerankWeights::for_task(TaskKind::General);
        assert!(review.confidence > general.confidence);
    }
}
