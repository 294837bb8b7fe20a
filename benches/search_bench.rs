//! Alexandria Search Benchmarks
//!
//! Benchmarks for core retrieval operations using Criterion.
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use alexandria_core::extract;
use alexandria_core::route;
use alexandria_core::search::{
    cosine_similarity, reciprocal_rank_fusion, sanitize_fts5_query, BruteForceIndex, LexicalHit,
    VectorHit, RRF_K,
};

fn bench_classify_intent(c: &mut Criterion) {
    let queries = [
        "why is this throwing an exception and a stack trace",
        "what naming convention and lint style do we use",
        "how do I implement a new endpoint",
        "why did we decide to use SQLite",
        "is this correct, can you double-check",
    ];

    c.bench_function("route", |b| {
        b.iter(|| {
            for q in &queries {
                black_box(route(q));
            }
        })
    });
}

fn bench_extract(c: &mut Criterion) {
    let content = "We decided to use SQLite instead of Postgres. \
        The fix was to add a missing await in the handler. \
        We must never commit secrets to the repository.";

    c.bench_function("extract_batch_single_event", |b| {
        b.iter(|| {
            black_box(extract(content, "ev1"));
        })
    });
}

fn bench_rrf_fusion(c: &mut Criterion) {
    let lexical: Vec<LexicalHit> = (0..50)
        .map(|i| LexicalHit { id: format!("mem-{i}"), score: 1.0 - i as f32 / 50.0 })
        .collect();
    let vector: Vec<VectorHit> = (0..50)
        .map(|i| VectorHit { id: format!("mem-{}", 25 + i), score: 1.0 - i as f32 / 50.0 })
        .collect();

    c.bench_function("reciprocal_rank_fusion_50x50", |b| {
        b.iter(|| {
            black_box(reciprocal_rank_fusion(&lexical, &vector, 0.5, RRF_K));
        })
    });
}

fn bench_sanitize_fts5(c: &mut Criterion) {
    c.bench_function("sanitize_fts5_query", |b| {
        b.iter(|| {
            black_box(sanitize_fts5_query("hello world \"exact phrase\" OR special-chars!@#"));
        })
    });
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a: Vec<f32> = (0..384).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..384).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_similarity_384d", |bencher| {
        bencher.iter(|| {
            black_box(cosine_similarity(&a, &b));
        })
    });
}

fn bench_brute_force_search(c: &mut Criterion) {
    let mut index = BruteForceIndex::new();
    for i in 0..500 {
        let v: Vec<f32> = (0..384).map(|j| ((i * 384 + j) as f32).sin()).collect();
        index.upsert(format!("mem-{i}"), v);
    }
    let query: Vec<f32> = (0..384).map(|j| (j as f32).cos()).collect();

    c.bench_function("brute_force_search_500x384_top10", |b| {
        b.iter(|| {
            black_box(index.search(&query, 10));
        })
    });
}

criterion_group!(
    benches,
    bench_classify_intent,
    bench_extract,
    bench_rrf_fusion,
    bench_sanitize_fts5,
    bench_cosine_similarity,
    bench_brute_force_search,
);
criterion_main!(benches);
