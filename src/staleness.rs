//! Staleness checker (spec §4.F).
//!
//! Compares each memory's code references against the working tree's git
//! history to decide whether the reference is still trustworthy. No
//! grounding precedent exists elsewhere in the corpus for git-backed
//! staleness detection; this module is written directly against the `git2`
//! API (see DESIGN.md).

use std::path::Path;

use git2::Repository;

use crate::error::Result;
use crate::memory::types::{CodeReference, MemoryObject};
use crate::storage::{content_hash, Storage};

/// Per-reference verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefStatus {
    /// The file has changed since the reference was last verified.
    Stale,
    /// The file exists and is unchanged, but has never been explicitly
    /// verified at a commit.
    NeedsReview,
    /// The file is unchanged since `verifiedAtCommit`.
    Verified,
}

/// Aggregate verdict for a whole memory object: worst-case over its refs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessVerdict {
    Stale,
    NeedsReview,
    Verified,
    /// The object carries no code references at all.
    NotApplicable,
}

fn worst(a: StalenessVerdict, b: StalenessVerdict) -> StalenessVerdict {
    use StalenessVerdict::*;
    fn rank(v: StalenessVerdict) -> u8 {
        match v {
            Stale => 3,
            NeedsReview => 2,
            Verified => 1,
            NotApplicable => 0,
        }
    }
    if rank(a) >= rank(b) {
        a
    } else {
        b
    }
}

/// Classify one code reference against the repository at `repo_root`.
///
/// A missing path is always `Stale`. Every other indeterminate case —
/// the repository cannot be discovered, the stamped commit no longer
/// exists, or there is nothing to compare against — degrades to
/// `NeedsReview` (never panics, never blocks the caller) rather than
/// silently reporting `Verified`, per spec §4.F ("ref_unknown degrades to
/// needs_review by policy").
///
/// `include_uncommitted` gates the `contentHash` fallback path (spec §4.F:
/// "AND `includeUncommitted` is requested"): when a reference carries no
/// `verifiedAtCommit` (no git commit to compare against, or no git
/// repository at all) but does carry a `contentHash`, pass `true` to
/// compare the working tree's current file hash against it.
pub fn classify_ref(repo_root: &Path, reference: &CodeReference, include_uncommitted: bool) -> RefStatus {
    let full_path = repo_root.join(&reference.path);
    if !full_path.exists() {
        return RefStatus::Stale;
    }

    let repo = Repository::discover(repo_root).ok();

    if let (Some(repo), Some(verified_commit)) = (&repo, &reference.verified_at_commit) {
        return match commits_touching_path_since(repo, &reference.path, verified_commit) {
            Some(true) => RefStatus::NeedsReview,
            Some(false) => RefStatus::Verified,
            None => RefStatus::NeedsReview,
        };
    }

    // No git repo, or a repo but no commit stamp: fall back to a content
    // hash comparison when one is available and the caller asked for it.
    if (repo.is_none() || reference.verified_at_commit.is_none()) && include_uncommitted {
        if let Some(expected_hash) = &reference.content_hash {
            return match std::fs::read_to_string(&full_path) {
                Ok(current_contents) => {
                    if content_hash(&current_contents) == *expected_hash {
                        RefStatus::Verified
                    } else {
                        RefStatus::NeedsReview
                    }
                }
                Err(_) => RefStatus::NeedsReview,
            };
        }
    }

    RefStatus::NeedsReview
}

/// `true` if `path` was modified in any commit reachable from HEAD that is
/// not an ancestor-or-equal of `since_commit`. `None` if the history walk
/// itself failed (unknown commit, detached history, shallow clone).
fn commits_touching_path_since(repo: &Repository, path: &str, since_commit: &str) -> Option<bool> {
    let since_oid = git2::Oid::from_str(since_commit).ok()?;
    let since = repo.find_commit(since_oid).ok()?;

    let mut walker = repo.revwalk().ok()?;
    walker.push_head().ok()?;
    walker.hide(since.id()).ok()?;

    for oid in walker.flatten() {
        let commit = repo.find_commit(oid).ok()?;
        let tree = commit.tree().ok()?;
        let parent_tree = commit.parents().next().and_then(|p| p.tree().ok());

        let diff = repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
            .ok()?;
        let touched = diff.deltas().any(|delta| {
            delta
                .new_file()
                .path()
                .map(|p| p.to_string_lossy() == path)
                .unwrap_or(false)
        });
        if touched {
            return Some(true);
        }
    }
    Some(false)
}

/// Aggregate staleness for a memory object: worst-over-refs (spec §4.F).
pub fn classify_object(repo_root: &Path, object: &MemoryObject, include_uncommitted: bool) -> StalenessVerdict {
    if object.code_refs.is_empty() {
        return StalenessVerdict::NotApplicable;
    }
    object
        .code_refs
        .iter()
        .map(|r| match classify_ref(repo_root, r, include_uncommitted) {
            RefStatus::Stale => StalenessVerdict::Stale,
            RefStatus::NeedsReview => StalenessVerdict::NeedsReview,
            RefStatus::Verified => StalenessVerdict::Verified,
        })
        .fold(StalenessVerdict::NotApplicable, worst)
}

/// The commit id at the tip of `repo_root`'s current HEAD, if resolvable.
fn current_head_commit(repo_root: &Path) -> Option<String> {
    let repo = Repository::discover(repo_root).ok()?;
    let head = repo.head().ok()?;
    let commit = head.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}

impl Storage {
    /// Walk every memory with code refs; for each whose every ref resolves
    /// to `verified`, stamp `verifiedAtCommit` to the current HEAD (spec
    /// §4.F: "after a commit, walk all memories with code refs ...
    /// idempotent"). Returns the ids stamped.
    pub fn auto_verify_unchanged(&self, repo_root: &Path) -> Result<Vec<String>> {
        let Some(head_commit) = current_head_commit(repo_root) else {
            return Ok(Vec::new());
        };

        let mut stamped = Vec::new();
        for object in self.list_memories(None, None)? {
            if object.code_refs.is_empty() {
                continue;
            }
            if classify_object(repo_root, &object, false) == StalenessVerdict::Verified {
                self.verify_memory(&object.id, &head_commit)?;
                stamped.push(object.id);
            }
        }
        Ok(stamped)
    }
}
