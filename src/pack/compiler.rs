//! Progressive disclosure pack compiler (spec §4.J).
//!
//! Assembles a token-budgeted [`ContextPack`] for a given disclosure level:
//! constraints and warnings always, query results at `task` and above,
//! related neighbours and decision history only at `deep`. Every inclusion
//! passes a common admission check and ends with a call through
//! [`crate::memory::store`]'s `record_memory_access` — the pack compiler
//! never mutates a memory row itself.

use std::collections::HashSet;
use std::path::Path;

use crate::error::Result;
use crate::ids::resolve_prefix;
use crate::intent::route;
use crate::memory::session::DisclosureLevel;
use crate::memory::types::{MemoryObject, ObjectType, ReviewStatus, Status};
use crate::search::vector::VectorBackend;
use crate::staleness::{classify_object, StalenessVerdict};
use crate::storage::Storage;

/// Token budget for each disclosure level (spec §4.J table).
fn token_budget(level: DisclosureLevel) -> u32 {
    match level {
        DisclosureLevel::Minimal => 500,
        DisclosureLevel::Task => 2000,
        DisclosureLevel::Deep => 4000,
    }
}

/// Fraction of the total token budget constraints alone may consume (spec
/// §4.J: "fractions 1.0/0.4/0.35").
fn constraint_budget_fraction(level: DisclosureLevel) -> f64 {
    match level {
        DisclosureLevel::Minimal => 1.0,
        DisclosureLevel::Task => 0.4,
        DisclosureLevel::Deep => 0.35,
    }
}

/// Hard cap on the number of constraints regardless of budget (spec §4.J:
/// "hard cap 60/25/35").
fn constraint_hard_cap(level: DisclosureLevel) -> usize {
    match level {
        DisclosureLevel::Minimal => 60,
        DisclosureLevel::Task => 25,
        DisclosureLevel::Deep => 35,
    }
}

/// Action a revalidation prompt recommends for one stale/unverified memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidationAction {
    Retire,
    Verify,
}

/// One entry in a pack's `revalidationPrompts` list (spec §4.J).
#[derive(Debug, Clone)]
pub struct RevalidationPrompt {
    pub memory_id: String,
    pub short_id: String,
    pub content_preview: String,
    pub action: RevalidationAction,
    pub reasons: Vec<String>,
}

/// Per-tier inclusion counts, surfaced for observability (spec §4.J: "a
/// per-tier breakdown").
#[derive(Debug, Clone, Default)]
pub struct TierCounts {
    pub constraints: usize,
    pub warnings: usize,
    pub priority: usize,
    pub query_results: usize,
    pub related: usize,
    pub history: usize,
}

/// Summary of the immediately prior session, attached to legacy packs
/// (spec §4.J: "optional `previousSession` block").
#[derive(Debug, Clone)]
pub struct PreviousSessionSummary {
    pub summary: String,
    pub working_file: Option<String>,
    pub working_task: Option<String>,
}

/// A compiled, token-budgeted context pack (spec §4.J).
#[derive(Debug, Clone)]
pub struct ContextPack {
    pub level: DisclosureLevel,
    pub tokens_used: u32,
    pub token_budget: u32,
    pub tier_counts: TierCounts,
    pub memories: Vec<MemoryObject>,
    pub revalidation_prompts: Vec<RevalidationPrompt>,
    /// Legacy surface: constraints duplicated out of `memories` for callers
    /// that still expect the pre-progressive-disclosure shape.
    pub constraints: Vec<MemoryObject>,
    /// Legacy surface: everything in `memories` that isn't a constraint or
    /// warning.
    pub relevant_objects: Vec<MemoryObject>,
    /// Candidates that were admissible but did not fit the remaining
    /// budget.
    pub overflow_count: u32,
    pub previous_session: Option<PreviousSessionSummary>,
}

/// Options controlling one pack compilation. All fields are optional; a
/// bare `PackRequest::new(level)` compiles the constraints+warnings-only
/// pack every level supports.
#[derive(Debug, Clone, Default)]
pub struct PackRequest<'a> {
    pub query: Option<&'a str>,
    pub query_embedding: Option<&'a [f32]>,
    pub priority_ids: Vec<String>,
    pub project_root: Option<&'a Path>,
    pub repo_root: Option<&'a Path>,
    pub session_id: Option<&'a str>,
}

impl<'a> PackRequest<'a> {
    pub fn new() -> Self {
        Self::default()
    }
}

struct Budget {
    total: u32,
    used: u32,
    constraint_cap_tokens: u32,
    constraint_cap_count: usize,
    constraint_used_tokens: u32,
    constraint_used_count: usize,
}

impl Budget {
    fn new(level: DisclosureLevel) -> Self {
        let total = token_budget(level);
        Self {
            total,
            used: 0,
            constraint_cap_tokens: (total as f64 * constraint_budget_fraction(level)) as u32,
            constraint_cap_count: constraint_hard_cap(level),
            constraint_used_tokens: 0,
            constraint_used_count: 0,
        }
    }

    fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }

    fn fits(&self, tokens: u32) -> bool {
        self.used + tokens <= self.total
    }

    fn constraint_fits(&self, tokens: u32) -> bool {
        self.constraint_used_count < self.constraint_cap_count && self.constraint_used_tokens + tokens <= self.constraint_cap_tokens
    }

    fn admit(&mut self, tokens: u32) {
        self.used += tokens;
    }

    fn admit_constraint(&mut self, tokens: u32) {
        self.constraint_used_tokens += tokens;
        self.constraint_used_count += 1;
        self.admit(tokens);
    }
}

/// Tracks which memories have already been admitted into the pack, by id
/// and by content hash, for the common admission check (spec §4.J: "not
/// already present; content hash not already seen").
#[derive(Default)]
struct Admitted {
    ids: HashSet<String>,
    content_hashes: HashSet<String>,
    overflow: u32,
}

impl Admitted {
    fn already_present(&self, object: &MemoryObject) -> bool {
        self.ids.contains(&object.id) || self.content_hashes.contains(&crate::storage::content_hash(&object.content))
    }

    fn record(&mut self, object: &MemoryObject) {
        self.ids.insert(object.id.clone());
        self.content_hashes.insert(crate::storage::content_hash(&object.content));
    }
}

fn normalized_keyword_bag(content: &str) -> Vec<String> {
    let mut words: Vec<String> = content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
        .collect();
    words.sort();
    words.dedup();
    words
}

fn shares_project_keyword(content: &str, vocabulary: &HashSet<String>) -> bool {
    if vocabulary.is_empty() {
        return true;
    }
    normalized_keyword_bag(content).iter().any(|w| vocabulary.contains(w))
}

/// Compile a context pack at `level` for `request` (spec §4.J algorithm).
pub fn compile_pack(storage: &Storage, level: DisclosureLevel, vectors: &VectorBackend, request: &PackRequest) -> Result<ContextPack> {
    let mut budget = Budget::new(level);
    let mut admitted = Admitted::default();
    let mut memories: Vec<MemoryObject> = Vec::new();
    let mut constraints_tier: Vec<MemoryObject> = Vec::new();
    let mut counts = TierCounts::default();

    let vocabulary = request.project_root.map(crate::project::project_keywords).unwrap_or_default();

    // 1. Constraints.
    let mut candidate_constraints = storage.list_memories(Some(ObjectType::Constraint), Some(Status::Active))?;
    candidate_constraints.retain(|c| c.review_status == ReviewStatus::Approved);
    candidate_constraints.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut seen_keyword_bags: HashSet<Vec<String>> = HashSet::new();
    for constraint in candidate_constraints {
        if admitted.already_present(&constraint) {
            continue;
        }
        if constraint.content.trim_end().ends_with(':') {
            continue;
        }
        if !shares_project_keyword(&constraint.content, &vocabulary) {
            continue;
        }
        let bag = normalized_keyword_bag(&constraint.content);
        if !seen_keyword_bags.insert(bag) {
            continue;
        }
        let tokens = crate::storage::estimate_tokens(&constraint.content) as u32;
        if !budget.constraint_fits(tokens) {
            admitted.overflow += 1;
            continue;
        }
        budget.admit_constraint(tokens);
        admitted.record(&constraint);
        storage.record_memory_access(&constraint.id)?;
        constraints_tier.push(constraint.clone());
        memories.push(constraint);
        counts.constraints += 1;
    }

    // 2. Warnings: up to 5 most-recently-updated stale objects.
    let mut warnings = storage.list_memories(None, Some(Status::Stale))?;
    warnings.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    for warning in warnings.into_iter().take(5) {
        if admitted.already_present(&warning) {
            continue;
        }
        let tokens = crate::storage::estimate_tokens(&warning.content) as u32;
        if !budget.fits(tokens) {
            admitted.overflow += 1;
            continue;
        }
        budget.admit(tokens);
        admitted.record(&warning);
        storage.record_memory_access(&warning.id)?;
        counts.warnings += 1;
        memories.push(warning);
    }

    // 3. Priority (hot) memories, in the caller-supplied order.
    for id_or_prefix in &request.priority_ids {
        let Some(object) = storage.get_memory(id_or_prefix)? else { continue };
        if object.status != Status::Active || admitted.already_present(&object) {
            continue;
        }
        let tokens = crate::storage::estimate_tokens(&object.content) as u32;
        if !budget.fits(tokens) {
            admitted.overflow += 1;
            continue;
        }
        budget.admit(tokens);
        admitted.record(&object);
        storage.record_memory_access(&object.id)?;
        counts.priority += 1;
        memories.push(object);
    }

    // 4. Query results (task/deep), or recent high-value defaults otherwise.
    let include_query_tier = level != DisclosureLevel::Minimal;
    if include_query_tier {
        if let (Some(query), Some(embedding)) = (request.query, request.query_embedding) {
            let plan = route(query);
            let ranked = storage.search_with_plan(query, embedding, vectors, &plan)?;
            for (object, _score) in ranked {
                if admitted.already_present(&object) {
                    continue;
                }
                let tokens = crate::storage::estimate_tokens(&object.content) as u32;
                if !budget.fits(tokens) {
                    admitted.overflow += 1;
                    continue;
                }
                budget.admit(tokens);
                admitted.record(&object);
                storage.record_memory_access(&object.id)?;
                counts.query_results += 1;
                memories.push(object);
            }
        } else {
            let mut defaults = Vec::new();
            for object_type in [ObjectType::Decision, ObjectType::KnownFix, ObjectType::Convention, ObjectType::Preference] {
                defaults.extend(storage.list_memories(Some(object_type), Some(Status::Active))?);
            }
            defaults.sort_by(|a, b| b.access_count.cmp(&a.access_count).then_with(|| b.created_at.cmp(&a.created_at)));
            for object in defaults.into_iter().take(20) {
                if admitted.already_present(&object) {
                    continue;
                }
                let tokens = crate::storage::estimate_tokens(&object.content) as u32;
                if !budget.fits(tokens) {
                    admitted.overflow += 1;
                    continue;
                }
                budget.admit(tokens);
                admitted.record(&object);
                storage.record_memory_access(&object.id)?;
                counts.query_results += 1;
                memories.push(object);
            }
        }
    }

    // 5. Related neighbours (deep only, with a query): vector-neighbours of
    // the first three currently-packed memories.
    if level == DisclosureLevel::Deep && request.query.is_some() {
        for seed in memories.iter().take(3).cloned().collect::<Vec<_>>() {
            let Some(seed_embedding) = vectors.get(&seed.id) else { continue };
            let neighbours = vectors.search(seed_embedding, 4);
            for hit in neighbours.into_iter().take(3) {
                if hit.id == seed.id {
                    continue;
                }
                let Some(object) = storage.get_memory(&hit.id)? else { continue };
                if admitted.already_present(&object) {
                    continue;
                }
                let tokens = crate::storage::estimate_tokens(&object.content) as u32;
                if !budget.fits(tokens) {
                    admitted.overflow += 1;
                    continue;
                }
                budget.admit(tokens);
                admitted.record(&object);
                storage.record_memory_access(&object.id)?;
                counts.related += 1;
                memories.push(object);
            }
        }
    }

    // 6. History (deep only, with a query): active or stale decisions.
    if level == DisclosureLevel::Deep && request.query.is_some() {
        let mut history = storage.list_memories(Some(ObjectType::Decision), Some(Status::Active))?;
        history.extend(storage.list_memories(Some(ObjectType::Decision), Some(Status::Stale))?);
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        for object in history.into_iter().take(10) {
            if admitted.already_present(&object) {
                continue;
            }
            let tokens = crate::storage::estimate_tokens(&object.content) as u32;
            if !budget.fits(tokens) {
                admitted.overflow += 1;
                continue;
            }
            budget.admit(tokens);
            admitted.record(&object);
            storage.record_memory_access(&object.id)?;
            counts.history += 1;
            memories.push(object);
        }
    }

    let revalidation_prompts = request.repo_root.map(|root| build_revalidation_prompts(root, &memories)).unwrap_or_default();

    let previous_session = request
        .session_id
        .and_then(|id| storage.previous_session(id).ok().flatten())
        .map(|session| PreviousSessionSummary {
            summary: format!(
                "{} events, {} objects created",
                session.event_count, session.objects_created
            ),
            working_file: session.working_file,
            working_task: session.working_task,
        });

    let relevant_objects = memories
        .iter()
        .filter(|m| m.object_type != ObjectType::Constraint && m.status != Status::Stale)
        .cloned()
        .collect();

    Ok(ContextPack {
        level,
        tokens_used: budget.used,
        token_budget: budget.total,
        tier_counts: counts,
        memories,
        revalidation_prompts,
        constraints: constraints_tier,
        relevant_objects,
        overflow_count: admitted.overflow,
        previous_session,
    })
}

/// Emit revalidation prompts for the assembled set, prioritising retire >
/// verify(changed) > verify(never-verified); constraints and decisions earn
/// a small priority bump (spec §4.J).
fn build_revalidation_prompts(repo_root: &Path, memories: &[MemoryObject]) -> Vec<RevalidationPrompt> {
    let mut prompts: Vec<(u8, RevalidationPrompt)> = Vec::new();

    for object in memories {
        let verdict = classify_object(repo_root, object, false);
        let (action, mut priority, reason) = match verdict {
            StalenessVerdict::Stale => (RevalidationAction::Retire, 3u8, "code reference no longer exists in the working tree"),
            StalenessVerdict::NeedsReview => (RevalidationAction::Verify, 1u8, "code reference has changed or was never verified"),
            StalenessVerdict::Verified | StalenessVerdict::NotApplicable => continue,
        };
        if matches!(object.object_type, ObjectType::Constraint | ObjectType::Decision) {
            priority += 1;
        }
        let short_id = object.id.chars().take(8).collect();
        prompts.push((
            priority,
            RevalidationPrompt {
                memory_id: object.id.clone(),
                short_id,
                content_preview: object.content.chars().take(120).collect(),
                action,
                reasons: vec![reason.to_string()],
            },
        ));
    }

    prompts.sort_by(|a, b| b.0.cmp(&a.0));
    prompts.into_iter().map(|(_, p)| p).collect()
}

/// Resolve an opaque id or prefix to a full memory id through the same
/// [`crate::ids::resolve_prefix`] used elsewhere, for callers assembling
/// `priority_ids` from user-facing shorthand.
pub fn resolve_priority_id(candidates: &[String], prefix: &str) -> Option<String> {
    match resolve_prefix(prefix, candidates.iter().map(String::as_str)) {
        crate::ids::PrefixResolution::Found(id) => Some(id.to_string()),
        _ => None,
    }
}
