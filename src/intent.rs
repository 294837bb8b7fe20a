//! Intent classifier + router (spec §4.I).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::memory::types::{ConfidenceTier, ObjectType};

/// One of the seven intents the classifier recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Debugging,
    Conventions,
    Implementation,
    Architecture,
    History,
    Validation,
    General,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Debugging => "debugging",
            Intent::Conventions => "conventions",
            Intent::Implementation => "implementation",
            Intent::Architecture => "architecture",
            Intent::History => "history",
            Intent::Validation => "validation",
            Intent::General => "general",
        }
    }
}

struct IntentRule {
    intent: Intent,
    patterns: &'static [&'static Lazy<Regex>],
    keywords: &'static [&'static str],
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).expect("valid built-in pattern"));
    };
}

pattern!(DBG_ERROR, r"(?i)\b(error|exception|stack trace|traceback|crash(ed)?|panic)\b");
pattern!(DBG_WHY_FAIL, r"(?i)\bwhy\b.{0,20}\b(fail|break|not work)");
pattern!(CONV_STYLE, r"(?i)\b(style|convention|formatting|lint)\b");
pattern!(IMPL_HOWTO, r"(?i)\bhow (do|should) I\b.{0,20}\bimplement\b");
pattern!(IMPL_ADD, r"(?i)\badd (a |an )?(new )?(feature|endpoint|function|method)\b");
pattern!(ARCH_DESIGN, r"(?i)\b(architecture|design|structure|module layout)\b");
pattern!(HIST_WHY_DECIDED, r"(?i)\bwhy (did|was)\b.{0,30}\b(chosen|decided|picked)\b");
pattern!(VALID_IS_CORRECT, r"(?i)\b(is (this|it) (correct|right|valid)|double[- ]check)\b");

static DEBUGGING_PATTERNS: &[&Lazy<Regex>] = &[&DBG_ERROR, &DBG_WHY_FAIL];
static CONVENTIONS_PATTERNS: &[&Lazy<Regex>] = &[&CONV_STYLE];
static IMPLEMENTATION_PATTERNS: &[&Lazy<Regex>] = &[&IMPL_HOWTO, &IMPL_ADD];
static ARCHITECTURE_PATTERNS: &[&Lazy<Regex>] = &[&ARCH_DESIGN];
static HISTORY_PATTERNS: &[&Lazy<Regex>] = &[&HIST_WHY_DECIDED];
static VALIDATION_PATTERNS: &[&Lazy<Regex>] = &[&VALID_IS_CORRECT];
static GENERAL_PATTERNS: &[&Lazy<Regex>] = &[];

static RULES: Lazy<[IntentRule; 7]> = Lazy::new(|| {
    [
        IntentRule {
            intent: Intent::Debugging,
            patterns: DEBUGGING_PATTERNS,
            keywords: &["bug", "fix", "broken", "fails", "failing", "stacktrace"],
        },
        IntentRule {
            intent: Intent::Conventions,
            patterns: CONVENTIONS_PATTERNS,
            keywords: &["naming", "format", "indent", "prettier", "eslint", "rustfmt"],
        },
        IntentRule {
            intent: Intent::Implementation,
            patterns: IMPLEMENTATION_PATTERNS,
            keywords: &["implement", "build", "write", "create"],
        },
        IntentRule {
            intent: Intent::Architecture,
            patterns: ARCHITECTURE_PATTERNS,
            keywords: &["architecture", "layer", "component", "module"],
        },
        IntentRule {
            intent: Intent::History,
            patterns: HISTORY_PATTERNS,
            keywords: &["history", "previously", "before", "rationale"],
        },
        IntentRule {
            intent: Intent::Validation,
            patterns: VALIDATION_PATTERNS,
            keywords: &["validate", "verify", "confirm", "sanity check"],
        },
        IntentRule {
            intent: Intent::General,
            patterns: GENERAL_PATTERNS,
            keywords: &[],
        },
    ]
});

fn score(query: &str, rule: &IntentRule) -> i32 {
    let lower = query.to_lowercase();
    let pattern_score: i32 = rule.patterns.iter().filter(|re| re.is_match(query)).count() as i32 * 3;
    let keyword_score: i32 = rule.keywords.iter().filter(|kw| lower.contains(*kw)).count() as i32;
    pattern_score + keyword_score
}

/// Classify a query into one of the seven intents (spec §4.I: "highest
/// score wins if ≥2 else general").
pub fn classify_intent(query: &str) -> Intent {
    let mut best = Intent::General;
    let mut best_score = 0;
    for rule in RULES.iter().filter(|r| r.intent != Intent::General) {
        let s = score(query, rule);
        if s > best_score {
            best_score = s;
            best = rule.intent;
        }
    }
    if best_score >= 2 {
        best
    } else {
        Intent::General
    }
}

/// Multiplicative/additive boost configuration attached to a retrieval plan.
#[derive(Debug, Clone, Default)]
pub struct Boosts {
    pub grounded: Option<f64>,
    pub has_code_refs: Option<f64>,
    pub recently_verified: Option<f64>,
    pub type_boosts: Vec<(ObjectType, f64)>,
}

/// The intent-specific retrieval plan the router yields (spec §4.I).
#[derive(Debug, Clone)]
pub struct RetrievalPlan {
    pub intent: Intent,
    pub type_filters: Vec<ObjectType>,
    pub token_budget: u32,
    pub boosts: Boosts,
    pub min_confidence: Option<ConfidenceTier>,
    pub include_stale: bool,
}

/// Route a query through [`classify_intent`] into its representative
/// retrieval plan (spec §4.I table).
pub fn route(query: &str) -> RetrievalPlan {
    let intent = classify_intent(query);
    plan_for(intent)
}

/// The fixed, representative plan for a given intent (spec §4.I table).
pub fn plan_for(intent: Intent) -> RetrievalPlan {
    use ObjectType::*;
    match intent {
        Intent::Debugging => RetrievalPlan {
            intent,
            type_filters: vec![FailedAttempt, KnownFix, Constraint],
            token_budget: 1000,
            boosts: Boosts { grounded: Some(1.5), ..Default::default() },
            min_confidence: None,
            include_stale: false,
        },
        Intent::Conventions => RetrievalPlan {
            intent,
            type_filters: vec![Convention, Preference, Constraint],
            token_budget: 500,
            boosts: Boosts::default(),
            min_confidence: None,
            include_stale: false,
        },
        Intent::Implementation => RetrievalPlan {
            intent,
            type_filters: vec![Decision, Convention, KnownFix, Constraint],
            token_budget: 800,
            boosts: Boosts { grounded: Some(1.3), ..Default::default() },
            min_confidence: None,
            include_stale: false,
        },
        Intent::Architecture => RetrievalPlan {
            intent,
            type_filters: vec![Decision, Convention],
            token_budget: 600,
            boosts: Boosts::default(),
            min_confidence: None,
            include_stale: false,
        },
        Intent::History => RetrievalPlan {
            intent,
            type_filters: vec![Decision],
            token_budget: 500,
            boosts: Boosts::default(),
            min_confidence: None,
            include_stale: true,
        },
        Intent::Validation => RetrievalPlan {
            intent,
            type_filters: vec![],
            token_budget: 300,
            boosts: Boosts { grounded: Some(2.0), ..Default::default() },
            min_confidence: Some(ConfidenceTier::Grounded),
            include_stale: false,
        },
        Intent::General => RetrievalPlan {
            intent,
            type_filters: vec![],
            token_budget: 800,
            boosts: Boosts { grounded: Some(1.2), ..Default::default() },
            min_confidence: None,
            include_stale: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_debugging_query() {
        assert_eq!(classify_intent("why is this throwing an exception and a stack trace"), Intent::Debugging);
    }

    #[test]
    fn classifies_conventions_query() {
        assert_eq!(classify_intent("what naming convention and lint style do we use"), Intent::Conventions);
    }

    #[test]
    fn weak_signal_falls_back_to_general() {
        assert_eq!(classify_intent("hello there"), Intent::General);
    }

    #[test]
    fn debugging_plan_matches_spec_table() {
        let plan = plan_for(Intent::Debugging);
        assert_eq!(plan.token_budget, 1000);
        assert_eq!(plan.boosts.grounded, Some(1.5));
        assert!(!plan.include_stale);
        assert_eq!(plan.type_filters, vec![ObjectType::FailedAttempt, ObjectType::KnownFix, ObjectType::Constraint]);
    }

    #[test]
    fn validation_plan_has_grounded_floor() {
        let plan = plan_for(Intent::Validation);
        assert_eq!(plan.min_confidence, Some(ConfidenceTier::Grounded));
    }

    #[test]
    fn history_plan_includes_stale() {
        let plan = plan_for(Intent::History);
        assert!(plan.include_stale);
    }
}
