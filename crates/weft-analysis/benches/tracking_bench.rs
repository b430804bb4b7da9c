//! Tracking throughput over templates with many reads of one source.
//!
//! Run with: cargo bench -p weft-analysis -- tracking

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use weft_analysis::{Aliases, CompilationContext, NodeId, SourceKind, TagKind, TagSpec, Tree, TreeBuilder};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `<let/state/>` followed by `reads` placeholders of `state.f{i % fields}`.
fn template(reads: usize, fields: usize) -> (Tree, NodeId) {
    let mut b = TreeBuilder::new();
    let state = b.declare("state");
    let tag = b.tag(TagSpec::new("let", TagKind::Core).with_var(state.node));
    let mut body = vec![tag];
    for i in 0..reads {
        let read = b.ident(state.binding);
        let member = b.member(read, &format!("f{}", i % fields));
        body.push(b.placeholder(member));
    }
    (b.finish(body), tag)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_tracking(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracking/reads");

    for reads in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(reads as u64));
        let (tree, tag) = template(reads, 16);

        group.bench_with_input(BenchmarkId::new("track", reads), &(), |b, _| {
            b.iter(|| {
                let mut cx = CompilationContext::new(&tree);
                cx.track_references(tag, Aliases::Empty, SourceKind::Let)
                    .expect("tracks");
                black_box(cx.finish())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tracking);
criterion_main!(benches);
