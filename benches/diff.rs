//! Performance benchmarks for collection diffing and remote flushes.
//!
//! Run with: `cargo bench --bench diff`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Diff, 1k members | <50µs | Single pass, no allocation beyond output |
//! | Flush, 100 edges × 10 members | <2ms | Includes inverse propagation |

use std::collections::HashSet;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use record_graph::{
    diff_collection, FlushPhase, Graph, GraphConfig, Identifier, IdentifierCache, InMemorySchema,
    Operation, RelationshipOptions,
};

fn members(cache: &IdentifierCache, range: std::ops::Range<usize>) -> Vec<Identifier> {
    range.map(|i| cache.get_or_create("comment", &i.to_string())).collect()
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_collection");

    for size in [10usize, 100, 1_000] {
        let cache = IdentifierCache::new();
        let prev = members(&cache, 0..size);
        let prev_set: HashSet<Identifier> = prev.iter().copied().collect();

        // Drop the first tenth, append as many new members.
        let shift = (size / 10).max(1);
        let next = members(&cache, shift..size + shift);
        let mut reversed = prev.clone();
        reversed.reverse();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("identical", size), &size, |b, _| {
            b.iter(|| diff_collection(black_box(&prev), &prev, &prev_set, &prev))
        });
        group.bench_with_input(BenchmarkId::new("shifted", size), &size, |b, _| {
            b.iter(|| diff_collection(black_box(&next), &prev, &prev_set, &prev))
        });
        group.bench_with_input(BenchmarkId::new("reversed", size), &size, |b, _| {
            b.iter(|| diff_collection(black_box(&reversed), &prev, &prev_set, &prev))
        });
    }

    group.finish();
}

fn bench_flush(c: &mut Criterion) {
    let mut schema = InMemorySchema::new();
    schema
        .has_many(
            "post",
            "comments",
            "comment",
            RelationshipOptions::default().with_async(false).with_inverse("post"),
        )
        .belongs_to(
            "comment",
            "post",
            "post",
            RelationshipOptions::default().with_async(false).with_inverse("comments"),
        );
    let schema = Arc::new(schema);

    c.bench_function("flush_100_posts_x_10_comments", |b| {
        b.iter_batched(
            || {
                let ids = Arc::new(IdentifierCache::new());
                let mut graph = Graph::builder(Arc::clone(&ids), schema.clone())
                    .config(GraphConfig::lenient())
                    .build();
                for post in 0..100 {
                    let record = ids.get_or_create("post", &post.to_string());
                    let value = members(&ids, post * 10..post * 10 + 10);
                    graph
                        .push(Operation::ReplaceRelatedRecords {
                            record,
                            field: "comments".into(),
                            value,
                        })
                        .unwrap();
                }
                graph
            },
            |mut graph| {
                graph.flush(FlushPhase::Coalesce).unwrap();
                graph
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_diff, bench_flush);
criterion_main!(benches);
