//! Criterion micro-benchmarks for range-tree add/remove/pick_from_cursor.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use msa_bench::fragmented_tree;

fn bench_add_remove_roundtrip(c: &mut Criterion) {
    c.bench_function("rangetree_add_remove_roundtrip", |b| {
        b.iter(|| {
            let mut tree = msa_bench::empty_tree();
            tree.add(0, 4096).unwrap();
            tree.remove(0, 4096).unwrap();
            black_box(tree.node_count());
        });
    });
}

fn bench_pick_from_cursor_1k_segments(c: &mut Criterion) {
    let tree = fragmented_tree(1_000, 4096, 8192);
    c.bench_function("rangetree_pick_from_cursor_1k_segments", |b| {
        b.iter(|| {
            let picked = tree.pick_from_cursor(black_box(0), 4096, 512);
            black_box(picked);
        });
    });
}

fn bench_walk_1k_segments(c: &mut Criterion) {
    let tree = fragmented_tree(1_000, 4096, 8192);
    c.bench_function("rangetree_walk_1k_segments", |b| {
        b.iter(|| {
            let mut total = 0u64;
            tree.walk(|seg| total += seg.len());
            black_box(total);
        });
    });
}

criterion_group!(
    benches,
    bench_add_remove_roundtrip,
    bench_pick_from_cursor_1k_segments,
    bench_walk_1k_segments
);
criterion_main!(benches);
