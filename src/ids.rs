//! Opaque identifiers
//!
//! Every persisted entity is keyed by a short hex id generated from a
//! UUID v4. Ids are never parsed for meaning; callers that need to
//! resolve a user-typed prefix go through [`resolve_prefix`].

use uuid::Uuid;

/// Minimum accepted length for a prefix lookup, per the data model: "by
/// unique prefix ≥ 8 hex chars".
pub const MIN_PREFIX_LEN: usize = 8;

/// Generate a new opaque id (32 lowercase hex characters, no dashes).
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Resolve a caller-supplied id or prefix against a list of candidate ids.
///
/// - If `needle` matches a candidate exactly, that candidate wins even if
///   it is also a prefix of others.
/// - Otherwise, exactly one candidate must start with `needle` (which must
///   be at least [`MIN_PREFIX_LEN`] characters); zero or more than one is
///   an error.
pub fn resolve_prefix<'a>(
    needle: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> PrefixResolution<'a> {
    let mut exact: Option<&'a str> = None;
    let mut matches: Vec<&'a str> = Vec::new();

    for candidate in candidates {
        if candidate == needle {
            exact = Some(candidate);
        }
        if candidate.starts_with(needle) {
            matches.push(candidate);
        }
    }

    if let Some(id) = exact {
        return PrefixResolution::Found(id);
    }

    if needle.len() < MIN_PREFIX_LEN {
        return PrefixResolution::TooShort;
    }

    match matches.len() {
        0 => PrefixResolution::NotFound,
        1 => PrefixResolution::Found(matches[0]),
        _ => PrefixResolution::Ambiguous(matches),
    }
}

/// Outcome of a prefix lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixResolution<'a> {
    /// Exactly one candidate matched.
    Found(&'a str),
    /// No candidate matched.
    NotFound,
    /// The prefix was shorter than [`MIN_PREFIX_LEN`] and not an exact match.
    TooShort,
    /// More than one candidate matched the prefix.
    Ambiguous(Vec<&'a str>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_32_hex_chars() {
        let id = new_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn resolve_prefix_unique_match() {
        let ids = ["abc123450000", "def999990000"];
        assert_eq!(
            resolve_prefix("abc12345", ids),
            PrefixResolution::Found("abc123450000")
        );
    }

    #[test]
    fn resolve_prefix_ambiguous() {
        let ids = ["abc123450000", "abc123459999"];
        matches!(resolve_prefix("abc12345", ids), PrefixResolution::Ambiguous(_));
    }

    #[test]
    fn resolve_prefix_not_found_with_full_id() {
        let ids: [&str; 0] = [];
        assert_eq!(
            resolve_prefix("0123456789abcdef0123456789abcdef", ids),
            PrefixResolution::NotFound
        );
    }

    #[test]
    fn resolve_prefix_too_short() {
        let ids = ["abc123450000"];
        assert_eq!(resolve_prefix("abc", ids), PrefixResolution::TooShort);
    }

    #[test]
    fn resolve_prefix_exact_wins_over_prefix_collision() {
        let ids = ["abc12345", "abc123450000"];
        assert_eq!(
            resolve_prefix("abc12345", ids),
            PrefixResolution::Found("abc12345")
        );
    }
}
