//! End-to-end scenarios exercising the reviewer, search, pack, and
//! staleness pipelines together against a single `Storage` handle, the way
//! a caller embedding this crate actually would.

use std::fs;

use alexandria_core::memory::session::DisclosureLevel;
use alexandria_core::memory::store::CreateMemoryInput;
use alexandria_core::memory::types::{CodeReference, Confidence, ObjectType, Status};
use alexandria_core::pack::{compile_pack, PackRequest};
use alexandria_core::reviewer::{auto_process, ProcessOutcome};
use alexandria_core::search::{reciprocal_rank_fusion, LexicalHit, VectorBackend, VectorHit, RRF_K};
use alexandria_core::storage::Storage;
use alexandria_core::{classify_object, route, MemoryCandidate, PrefixResolution, StalenessVerdict, MIN_PREFIX_LEN};
use alexandria_core::resolve_prefix;

/// Scenario 1 — Supersession by fix.
#[test]
fn scenario_1_supersession_by_fix() {
    let storage = Storage::open_in_memory().unwrap();

    let failed = storage
        .create_memory(CreateMemoryInput {
            content: "tried useCallback but state stays stale".into(),
            object_type: ObjectType::FailedAttempt,
            confidence: Confidence::Medium,
            ..Default::default()
        })
        .unwrap();

    let candidate = MemoryCandidate {
        content: "The fix is to memoise with useMemo; now it works".into(),
        suggested_type: ObjectType::KnownFix,
        evidence_event_ids: vec!["ev-fix".into()],
        evidence_excerpt: "The fix is to memoise with useMemo; now it works".into(),
        confidence: Confidence::High,
    };

    let outcome = auto_process(&storage, &candidate, &[], Some((&failed, 0.9))).unwrap();
    let new_id = match outcome {
        ProcessOutcome::Superseded { new, old_id } => {
            assert_eq!(old_id, failed.id);
            new.id
        }
        other => panic!("expected supersede, got {other:?}"),
    };

    let original = storage.get_memory(&failed.id).unwrap().unwrap();
    assert_eq!(original.status, Status::Superseded);
    assert_eq!(original.superseded_by.as_deref(), Some(new_id.as_str()));

    let embedding = vec![0.0_f32; 384];
    let vectors = VectorBackend::new();
    let results = storage.search("useCallback memoise", &embedding, &vectors, 10).unwrap();
    let active_hits: Vec<_> = results
        .into_iter()
        .filter_map(|hit| storage.get_memory(&hit.id).unwrap())
        .filter(|m| m.status == Status::Active)
        .collect();
    assert_eq!(active_hits.len(), 1);
    assert_eq!(active_hits[0].id, new_id);
}

/// Scenario 2 — Intent-routed retrieval.
#[test]
fn scenario_2_intent_routed_retrieval() {
    let storage = Storage::open_in_memory().unwrap();

    let constraint = storage
        .create_memory(CreateMemoryInput {
            content: "Never store plaintext secrets in the auth config".into(),
            object_type: ObjectType::Constraint,
            confidence: Confidence::High,
            ..Default::default()
        })
        .unwrap();
    storage.approve_memory(&constraint.id).unwrap();

    let decision = storage
        .create_memory(CreateMemoryInput {
            content: "Use JWT for auth tokens instead of cookies".into(),
            object_type: ObjectType::Decision,
            confidence: Confidence::High,
            ..Default::default()
        })
        .unwrap();
    storage.approve_memory(&decision.id).unwrap();

    let failed = storage
        .create_memory(CreateMemoryInput {
            content: "Cookie auth leaked, auth failing under load, auth is failing".into(),
            object_type: ObjectType::FailedAttempt,
            confidence: Confidence::High,
            ..Default::default()
        })
        .unwrap();

    let plan = route("why is auth failing?");
    assert_eq!(plan.intent.as_str(), "debugging");
    assert!(plan.type_filters.contains(&ObjectType::FailedAttempt));
    assert!(plan.type_filters.contains(&ObjectType::Constraint));
    assert!(!plan.type_filters.contains(&ObjectType::Decision));

    let embedding = vec![0.0_f32; 384];
    let vectors = VectorBackend::new();
    let ranked = storage.search_with_plan("why is auth failing?", &embedding, &vectors, &plan).unwrap();

    let ids: Vec<&str> = ranked.iter().map(|(object, _)| object.id.as_str()).collect();
    assert!(!ids.contains(&decision.id.as_str()), "decision excluded by type filter");
    assert_eq!(ids[0], failed.id, "failed_attempt ranks first");
    assert!(ids.contains(&constraint.id.as_str()));
}

/// Scenario 3 — Progressive minimal pack.
#[test]
fn scenario_3_progressive_minimal_pack() {
    let storage = Storage::open_in_memory().unwrap();

    for i in 0..4 {
        let constraint = storage
            .create_memory(CreateMemoryInput {
                content: format!("Constraint number {i} about deploys and secrets handling"),
                object_type: ObjectType::Constraint,
                confidence: Confidence::High,
                ..Default::default()
            })
            .unwrap();
        storage.approve_memory(&constraint.id).unwrap();
    }

    let mut stale_ids = Vec::new();
    for i in 0..2 {
        let object = storage
            .create_memory(CreateMemoryInput {
                content: format!("Stale memory {i} referencing a removed module"),
                object_type: ObjectType::Decision,
                ..Default::default()
            })
            .unwrap();
        storage.mark_memory_stale(&object.id, "superseded by redesign").unwrap();
        stale_ids.push(object.id);
    }

    let vectors = VectorBackend::new();
    let pack = compile_pack(&storage, DisclosureLevel::Minimal, &vectors, &PackRequest::new()).unwrap();

    assert_eq!(pack.tier_counts.constraints, 4);
    assert!(pack.memories.iter().all(|m| m.object_type == ObjectType::Constraint || m.status == Status::Stale));
    assert!(pack.tokens_used <= 500);
    assert_eq!(pack.tier_counts.query_results, 0);

    let warned_ids: Vec<&str> = pack
        .memories
        .iter()
        .filter(|m| m.status == Status::Stale)
        .map(|m| m.id.as_str())
        .collect();
    assert!(stale_ids.iter().all(|id| warned_ids.contains(&id.as_str())));
}

/// Scenario 4 — Staleness classification against a real git repository.
#[test]
fn scenario_4_staleness_classification() {
    let dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();

    let api_path = dir.path().join("src");
    fs::create_dir_all(&api_path).unwrap();
    let file_path = api_path.join("api.ts");
    fs::write(&file_path, "export function handler() {}\n").unwrap();

    let signature = git2::Signature::now("Test", "test@example.com").unwrap();
    let commit_h0 = {
        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("src/api.ts")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &signature, &signature, "H0", &tree, &[]).unwrap()
    };

    let storage = Storage::open_in_memory().unwrap();
    let mut reference = CodeReference::for_file("src/api.ts");
    reference.verified_at_commit = Some(commit_h0.to_string());
    let memory = storage
        .create_memory(CreateMemoryInput {
            content: "api.ts exposes a single handler export".into(),
            object_type: ObjectType::Decision,
            code_refs: vec![reference],
            ..Default::default()
        })
        .unwrap();

    fs::write(&file_path, "export function handler() { return 1; }\n").unwrap();
    {
        let parent = repo.find_commit(commit_h0).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("src/api.ts")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &signature, &signature, "H1", &tree, &[&parent]).unwrap();
    }

    let verdict = classify_object(dir.path(), &memory, false);
    assert_eq!(verdict, StalenessVerdict::NeedsReview);

    let head = repo.head().unwrap().peel_to_commit().unwrap().id().to_string();
    storage.verify_memory(&memory.id, &head).unwrap();
    let verified = storage.get_memory(&memory.id).unwrap().unwrap();
    let verdict_after = classify_object(dir.path(), &verified, false);
    assert_eq!(verdict_after, StalenessVerdict::Verified);
}

/// Scenario 5 — RRF fusion produces the spec's exact ordering.
#[test]
fn scenario_5_rrf_fusion_ordering() {
    let lexical = vec![
        LexicalHit { id: "A".into(), score: 3.0 },
        LexicalHit { id: "B".into(), score: 2.0 },
        LexicalHit { id: "C".into(), score: 1.0 },
    ];
    let vector = vec![
        VectorHit { id: "C".into(), score: 0.9 },
        VectorHit { id: "A".into(), score: 0.8 },
        VectorHit { id: "D".into(), score: 0.7 },
    ];

    let fused = reciprocal_rank_fusion(&lexical, &vector, 0.5, RRF_K);
    let order: Vec<&str> = fused.iter().map(|hit| hit.id.as_str()).collect();
    assert_eq!(order, vec!["A", "C", "B", "D"]);
}

/// Scenario 6 — Prefix resolution.
#[test]
fn scenario_6_prefix_resolution_unique_match() {
    let storage = Storage::open_in_memory().unwrap();
    let created = storage
        .create_memory(CreateMemoryInput { content: "a lone memory".into(), ..Default::default() })
        .unwrap();

    let prefix = &created.id[..MIN_PREFIX_LEN];
    let found = storage.get_memory(prefix).unwrap();
    assert_eq!(found.map(|m| m.id), Some(created.id));
}

#[test]
fn scenario_6_prefix_resolution_ambiguous_and_not_found() {
    let ids = ["abc1234500000000000000000000000", "abc1234599999999999999999999999"];
    assert!(matches!(resolve_prefix("abc12345", ids), PrefixResolution::Ambiguous(_)));

    let ids: [&str; 0] = [];
    assert_eq!(
        resolve_prefix("0123456789abcdef0123456789abcdef", ids),
        PrefixResolution::NotFound
    );
}
