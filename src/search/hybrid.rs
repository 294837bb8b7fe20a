//! Hybrid search fusion (spec §4.G).
//!
//! Two-stage pipeline: lexical (FTS5/BM25) and dense vector hits are each
//! ranked independently, then combined with Reciprocal Rank Fusion. Unlike
//! a plain sum of reciprocal ranks, the spec's formula adds 1 to every rank
//! before taking the reciprocal, so a rank-0 hit scores `1/(K+1)` rather
//! than `1/K`.

use std::collections::HashMap;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::intent::RetrievalPlan;
use crate::memory::types::{CodeReference, ConfidenceTier, MemoryObject};
use crate::search::lexical::LexicalHit;
use crate::search::vector::{VectorBackend, VectorHit};
use crate::storage::Storage;

/// RRF fusion constant (spec §4.G: "K=60").
pub const RRF_K: f64 = 60.0;

/// Default fusion weight toward lexical vs. vector (spec §4.G: "default α=0.5").
pub const DEFAULT_ALPHA: f64 = 0.5;

/// Source a hit came from, surfaced to callers as `matchType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Lexical,
    Vector,
    Both,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Lexical => "lexical",
            MatchType::Vector => "vector",
            MatchType::Both => "both",
        }
    }
}

/// One fused search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub match_type: MatchType,
}

/// A scope extracted from a free-text query (spec §4.G: "Scope matching").
#[derive(Debug, Clone, PartialEq)]
enum QueryScope {
    /// An exact file path, recognised by a known extension.
    Path(String),
    /// A named module/directory/area, e.g. "auth" or "the billing module".
    Module(String),
    /// The fixed "global" area keyword: everything matches weakly.
    Global,
}

/// File extensions recognised as "this query names a specific file"
/// (spec §4.G: "patterns for file paths with known extensions").
const KNOWN_EXTENSIONS: &str =
    "rs|ts|tsx|js|jsx|py|go|java|rb|c|cc|cpp|h|hpp|cs|php|kt|swift|md|json|yaml|yml|toml|sql";

/// Fixed area keyword set (spec §4.G: "a fixed area keyword set").
const AREA_KEYWORDS: &[&str] = &[
    "auth", "api", "frontend", "backend", "database", "storage", "search", "tests", "config", "cli", "docs",
];

static SCOPE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\b[\w./-]+\.({KNOWN_EXTENSIONS})\b")).expect("valid built-in pattern"));
static SCOPE_IN_MODULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bin the (\w+) module\b").expect("valid built-in pattern"));
static SCOPE_DIRECTORY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\w+) directory\b").expect("valid built-in pattern"));

/// Extract a scope from a free-text query, if any (spec §4.G: "Scope
/// matching"). Checked in order of specificity: an exact file path, then
/// an explicit "in the X module"/"X directory" phrase, then the fixed area
/// keyword set (where the literal word "global" maps to [`QueryScope::Global`]).
fn extract_scope(query: &str) -> Option<QueryScope> {
    if let Some(m) = SCOPE_PATH.find(query) {
        return Some(QueryScope::Path(m.as_str().to_string()));
    }
    if let Some(caps) = SCOPE_IN_MODULE.captures(query) {
        return Some(QueryScope::Module(caps[1].to_lowercase()));
    }
    if let Some(caps) = SCOPE_DIRECTORY.captures(query) {
        return Some(QueryScope::Module(caps[1].to_lowercase()));
    }
    let lower = query.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().map(|w| w.trim_matches(|c: char| !c.is_alphanumeric())).collect();
    if words.contains(&"global") {
        return Some(QueryScope::Global);
    }
    AREA_KEYWORDS
        .iter()
        .find(|keyword| words.contains(keyword))
        .map(|keyword| QueryScope::Module(keyword.to_string()))
}

fn paths_match(a: &str, b: &str) -> bool {
    a == b || a.ends_with(&format!("/{b}")) || b.ends_with(&format!("/{a}"))
}

fn path_in_module(path: &str, module: &str) -> bool {
    std::path::Path::new(path).components().any(|c| c.as_os_str().to_string_lossy().eq_ignore_ascii_case(module))
}

/// `scopeMatch(codeRefs, scope)` (spec §4.G): 1.0 exact path, 0.8 file
/// inside the named module, 0.1 global fallback, 0 otherwise. An object
/// with no code refs has nothing to match against scope.
fn scope_match(code_refs: &[CodeReference], scope: &QueryScope) -> f64 {
    if code_refs.is_empty() {
        return 0.0;
    }
    match scope {
        QueryScope::Path(path) => {
            if code_refs.iter().any(|r| paths_match(&r.path, path)) {
                1.0
            } else {
                0.0
            }
        }
        QueryScope::Module(module) => {
            if code_refs.iter().any(|r| path_in_module(&r.path, module)) {
                0.8
            } else {
                0.0
            }
        }
        QueryScope::Global => 0.1,
    }
}

/// Reciprocal Rank Fusion: `score(d) = α·1/(K+rank_FTS(d)+1) + (1−α)·1/(K+rank_VEC(d)+1)`.
///
/// Ranks are 0-based positions within each input list; a document absent
/// from a list contributes 0 for that term.
pub fn reciprocal_rank_fusion(
    lexical: &[LexicalHit],
    vector: &[VectorHit],
    alpha: f64,
    k: f64,
) -> Vec<SearchHit> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut from_lexical: HashMap<String, bool> = HashMap::new();
    let mut from_vector: HashMap<String, bool> = HashMap::new();

    for (rank, hit) in lexical.iter().enumerate() {
        *scores.entry(hit.id.clone()).or_default() += alpha * (1.0 / (k + rank as f64 + 1.0));
        from_lexical.insert(hit.id.clone(), true);
    }
    for (rank, hit) in vector.iter().enumerate() {
        *scores.entry(hit.id.clone()).or_default() += (1.0 - alpha) * (1.0 / (k + rank as f64 + 1.0));
        from_vector.insert(hit.id.clone(), true);
    }

    let mut fused: Vec<SearchHit> = scores
        .into_iter()
        .map(|(id, score)| {
            let match_type = match (from_lexical.contains_key(&id), from_vector.contains_key(&id)) {
                (true, true) => MatchType::Both,
                (true, false) => MatchType::Lexical,
                (false, true) => MatchType::Vector,
                (false, false) => unreachable!("id present in scores without contributing source"),
            };
            SearchHit { id, score, match_type }
        })
        .collect();

    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

impl Storage {
    /// Plain hybrid search: lexical + vector fused by RRF, no intent plan.
    pub fn search(&self, query: &str, query_embedding: &[f32], vectors: &VectorBackend, limit: usize) -> Result<Vec<SearchHit>> {
        let source_limit = (limit * 4).max(20);
        let lexical = self.lexical_search(query, source_limit)?;
        let vector = vectors.search(query_embedding, source_limit);

        let mut fused = reciprocal_rank_fusion(&lexical, &vector, DEFAULT_ALPHA, RRF_K);
        fused.truncate(limit);
        Ok(fused)
    }

    /// Intent-plan-aware search: fuse, then filter by type/confidence/scope,
    /// apply the plan's boosts, and trim to the plan's token budget
    /// (spec §4.G, §4.I).
    pub fn search_with_plan(
        &self,
        query: &str,
        query_embedding: &[f32],
        vectors: &VectorBackend,
        plan: &RetrievalPlan,
    ) -> Result<Vec<(MemoryObject, f64)>> {
        let source_limit = 50;
        let lexical = self.lexical_search(query, source_limit)?;
        let vector = vectors.search(query_embedding, source_limit);
        let fused = reciprocal_rank_fusion(&lexical, &vector, DEFAULT_ALPHA, RRF_K);
        let scope = extract_scope(query);

        let mut annotated = Vec::new();

        for hit in fused {
            let Some(object) = self.get_memory(&hit.id)? else {
                continue;
            };

            if !plan.include_stale && object.status == crate::memory::types::Status::Stale {
                continue;
            }
            if !plan.type_filters.is_empty() && !plan.type_filters.contains(&object.object_type) {
                continue;
            }
            if let Some(floor) = plan.min_confidence {
                if !object.confidence_tier.meets_floor(floor) {
                    continue;
                }
            }

            let mut score = hit.score;
            if let Some(grounded_boost) = plan.boosts.grounded {
                if object.confidence_tier == ConfidenceTier::Grounded {
                    score *= grounded_boost;
                }
            }
            if let Some(has_code_refs_boost) = plan.boosts.has_code_refs {
                if !object.code_refs.is_empty() {
                    score *= has_code_refs_boost;
                }
            }
            if let Some(recently_verified_boost) = plan.boosts.recently_verified {
                if let Some(last_verified_at) = object.last_verified_at {
                    if (Utc::now() - last_verified_at).num_days() <= 7 {
                        score *= recently_verified_boost;
                    }
                }
            }
            for (object_type, boost) in &plan.boosts.type_boosts {
                if *object_type == object.object_type {
                    score += boost / 100.0;
                }
            }
            if let Some(scope) = &scope {
                score *= 1.0 + 0.5 * scope_match(&object.code_refs, scope);
            }

            annotated.push((object, score));
        }

        annotated.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let cap = (plan.token_budget / 30) as usize;
        annotated.truncate(cap);
        Ok(annotated)
    }
}
