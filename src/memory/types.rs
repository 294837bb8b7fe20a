//! Core data model for memory objects (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AlexandriaError, Result};

// ============================================================================
// ENUMS
// ============================================================================

/// Kind of curated memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Decision,
    Preference,
    Convention,
    KnownFix,
    Constraint,
    FailedAttempt,
    Environment,
}

impl ObjectType {
    /// Fixed type priority used by the extractor's tie-break rule and the
    /// reranker's type-priority sub-score (spec §4.C step 2, §4.H).
    pub fn fixed_priority(self) -> u32 {
        match self {
            ObjectType::FailedAttempt => 100,
            ObjectType::KnownFix => 90,
            ObjectType::Constraint => 85,
            ObjectType::Decision => 80,
            ObjectType::Convention => 60,
            ObjectType::Preference => 40,
            ObjectType::Environment => 30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Decision => "decision",
            ObjectType::Preference => "preference",
            ObjectType::Convention => "convention",
            ObjectType::KnownFix => "known_fix",
            ObjectType::Constraint => "constraint",
            ObjectType::FailedAttempt => "failed_attempt",
            ObjectType::Environment => "environment",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "decision" => ObjectType::Decision,
            "preference" => ObjectType::Preference,
            "convention" => ObjectType::Convention,
            "known_fix" => ObjectType::KnownFix,
            "constraint" => ObjectType::Constraint,
            "failed_attempt" => ObjectType::FailedAttempt,
            "environment" => ObjectType::Environment,
            other => {
                return Err(AlexandriaError::InvalidEnum {
                    field: "objectType",
                    value: other.to_string(),
                })
            }
        })
    }

    /// Extractor tie-break priority order, highest first (spec §4.C step 2).
    pub const TIE_BREAK_ORDER: [ObjectType; 7] = [
        ObjectType::FailedAttempt,
        ObjectType::KnownFix,
        ObjectType::Constraint,
        ObjectType::Decision,
        ObjectType::Convention,
        ObjectType::Preference,
        ObjectType::Environment,
    ];
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a memory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Stale,
    Superseded,
    Retired,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Stale => "stale",
            Status::Superseded => "superseded",
            Status::Retired => "retired",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "active" => Status::Active,
            "stale" => Status::Stale,
            "superseded" => Status::Superseded,
            "retired" => Status::Retired,
            other => {
                return Err(AlexandriaError::InvalidEnum {
                    field: "status",
                    value: other.to_string(),
                })
            }
        })
    }
}

/// Legacy, user-supplied confidence label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Certain,
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Certain => "certain",
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "certain" => Confidence::Certain,
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            "low" => Confidence::Low,
            other => {
                return Err(AlexandriaError::InvalidEnum {
                    field: "confidence",
                    value: other.to_string(),
                })
            }
        })
    }

    /// Position on a 4-point scale, highest first. Used by the merger to
    /// pick the maximum confidence across merged candidates.
    pub fn rank(self) -> u8 {
        match self {
            Confidence::Certain => 3,
            Confidence::High => 2,
            Confidence::Medium => 1,
            Confidence::Low => 0,
        }
    }
}

/// Derived trust tier (spec §4.D). Never set directly by callers — always
/// recomputed by [`crate::memory::store::derive_confidence_tier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Hypothesis,
    Inferred,
    Observed,
    Grounded,
}

impl ConfidenceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::Grounded => "grounded",
            ConfidenceTier::Observed => "observed",
            ConfidenceTier::Inferred => "inferred",
            ConfidenceTier::Hypothesis => "hypothesis",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "grounded" => ConfidenceTier::Grounded,
            "observed" => ConfidenceTier::Observed,
            "inferred" => ConfidenceTier::Inferred,
            "hypothesis" => ConfidenceTier::Hypothesis,
            other => {
                return Err(AlexandriaError::InvalidEnum {
                    field: "confidenceTier",
                    value: other.to_string(),
                })
            }
        })
    }

    /// `tierBoost` used by the reranker's confidence sub-score (spec §4.H).
    pub fn tier_boost(self) -> f64 {
        match self {
            ConfidenceTier::Grounded => 2.0,
            ConfidenceTier::Observed => 1.5,
            ConfidenceTier::Inferred => 1.0,
            ConfidenceTier::Hypothesis => 0.5,
        }
    }

    /// True if `self` meets or exceeds a "minimum tier" floor, per the
    /// spec's canonicalised semantics: `minConfidence=grounded` means
    /// grounded-only, `minConfidence=inferred` means {grounded, observed,
    /// inferred}. Relies on the `Ord` derive ordering the tiers
    /// hypothesis < inferred < observed < grounded.
    pub fn meets_floor(self, floor: ConfidenceTier) -> bool {
        self >= floor
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Review state of a memory object or reviewer-queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "pending" => ReviewStatus::Pending,
            "approved" => ReviewStatus::Approved,
            "rejected" => ReviewStatus::Rejected,
            other => {
                return Err(AlexandriaError::InvalidEnum {
                    field: "reviewStatus",
                    value: other.to_string(),
                })
            }
        })
    }
}

/// Scope kind a memory object applies at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Global,
    Project,
    Module,
    File,
}

impl ScopeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeType::Global => "global",
            ScopeType::Project => "project",
            ScopeType::Module => "module",
            ScopeType::File => "file",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "global" => ScopeType::Global,
            "project" => ScopeType::Project,
            "module" => ScopeType::Module,
            "file" => ScopeType::File,
            other => {
                return Err(AlexandriaError::InvalidEnum {
                    field: "scope.type",
                    value: other.to_string(),
                })
            }
        })
    }
}

/// Where a memory object applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Scope {
    pub fn global() -> Self {
        Self {
            scope_type: ScopeType::Global,
            path: None,
        }
    }
}

/// Kind of code reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeRefType {
    File,
    Symbol,
    LineRange,
}

impl CodeRefType {
    pub fn as_str(self) -> &'static str {
        match self {
            CodeRefType::File => "file",
            CodeRefType::Symbol => "symbol",
            CodeRefType::LineRange => "line_range",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "file" => CodeRefType::File,
            "symbol" => CodeRefType::Symbol,
            "line_range" => CodeRefType::LineRange,
            other => {
                return Err(AlexandriaError::InvalidEnum {
                    field: "codeRef.type",
                    value: other.to_string(),
                })
            }
        })
    }
}

/// A reference from a memory object to a location in the working tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeReference {
    #[serde(rename = "type")]
    pub ref_type: CodeRefType,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_range: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl CodeReference {
    pub fn for_file(path: impl Into<String>) -> Self {
        Self {
            ref_type: CodeRefType::File,
            path: path.into(),
            symbol: None,
            line_range: None,
            verified_at_commit: None,
            content_hash: None,
        }
    }
}

/// The type-specific structured payload carried by some memory objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Structured {
    Decision {
        #[serde(default)]
        alternatives: Vec<String>,
        rationale: String,
        #[serde(default)]
        tradeoffs: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        decided_by: Option<String>,
    },
    Contract {
        name: String,
        contract_type: String,
        definition: String,
        version: String,
    },
}

/// The curated unit of knowledge (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryObject {
    pub id: String,
    pub content: String,
    pub object_type: ObjectType,
    pub scope: Scope,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    pub confidence: Confidence,
    pub confidence_tier: ConfidenceTier,
    #[serde(default)]
    pub evidence_event_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_excerpt: Option<String>,
    pub review_status: ReviewStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub access_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub code_refs: Vec<CodeReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub supersedes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<Structured>,
    pub strength: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reinforced_at: Option<DateTime<Utc>>,
    pub outcome_score: f64,
}

impl MemoryObject {
    /// True once this object is no longer eligible for default retrieval
    /// (spec §3: `status=retired` ⇒ not returned from default retrieval).
    pub fn is_default_visible(&self) -> bool {
        self.status != Status::Retired
    }
}

// ============================================================================
// OUTCOME RECORDS
// ============================================================================

/// Feedback signal on whether a retrieved memory was helpful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Helpful,
    Unhelpful,
    Neutral,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Helpful => "helpful",
            OutcomeKind::Unhelpful => "unhelpful",
            OutcomeKind::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "helpful" => OutcomeKind::Helpful,
            "unhelpful" => OutcomeKind::Unhelpful,
            "neutral" => OutcomeKind::Neutral,
            other => {
                return Err(AlexandriaError::InvalidEnum {
                    field: "outcome",
                    value: other.to_string(),
                })
            }
        })
    }

    /// Numeric contribution used by the smoothed rolling average.
    pub fn value(self) -> f64 {
        match self {
            OutcomeKind::Helpful => 1.0,
            OutcomeKind::Unhelpful => 0.0,
            OutcomeKind::Neutral => 0.5,
        }
    }
}

/// A single helpful/unhelpful/neutral feedback event against a memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub id: String,
    pub memory_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

// ============================================================================
// CONFLICTS
// ============================================================================

/// Kind of conflict the reviewer surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    Contradiction,
    Duplicate,
    Supersession,
    Ambiguity,
}

/// How severe the reviewer judged a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A suggested way to resolve a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedResolution {
    KeepExisting,
    Replace,
    Merge,
    KeepBoth,
    RejectBoth,
}

/// Lifecycle state of a surfaced conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Pending,
    Resolved,
}

/// A contradiction, duplicate, supersession, or ambiguity flagged by the
/// reviewer pipeline for human resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: String,
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub new_candidate: String,
    pub existing_memories: Vec<String>,
    pub suggested_resolution: SuggestedResolution,
    pub description: String,
    pub status: ConflictStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_resolution: Option<SuggestedResolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}
