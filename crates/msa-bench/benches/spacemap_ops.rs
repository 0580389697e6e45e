//! Criterion micro-benchmarks for space-map write and load (replay).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use msa_rangetree::RangeTree;
use msa_spacemap::{ObjectStore, RecordKind, SpaceMap};
use msa_testkit::InMemoryObjectStore;
use msa_types::Sense;

const MS_SIZE: u64 = 1 << 27; // 128 MiB
const ASHIFT: u32 = 9; // 512-byte sectors

fn alloc_tree(segments: u64, run_len: u64, stride: u64) -> RangeTree {
    let tree = msa_bench::fragmented_tree(segments, run_len, stride);
    assert!(segments * stride <= MS_SIZE);
    tree
}

fn bench_write_1k_runs(c: &mut Criterion) {
    let mut store = InMemoryObjectStore::new();
    let object = store.obj_alloc().unwrap();
    let tree = alloc_tree(1_000, 4096, 8192);

    c.bench_function("spacemap_write_1k_runs", |b| {
        b.iter(|| {
            let mut sm = SpaceMap::new(object, 0, MS_SIZE, ASHIFT);
            store.obj_truncate(object).unwrap();
            sm.write(&mut store, black_box(&tree), RecordKind::Alloc).unwrap();
        });
    });
}

fn bench_load_1k_runs(c: &mut Criterion) {
    let mut store = InMemoryObjectStore::new();
    let object = store.obj_alloc().unwrap();
    let tree = alloc_tree(1_000, 4096, 8192);
    let mut sm = SpaceMap::new(object, 0, MS_SIZE, ASHIFT);
    sm.write(&mut store, &tree, RecordKind::Alloc).unwrap();

    c.bench_function("spacemap_load_1k_runs", |b| {
        b.iter(|| {
            let mut target = msa_bench::empty_tree();
            target.add(0, MS_SIZE).unwrap();
            sm.load(&store, &mut target, Sense::Free).unwrap();
            black_box(target.node_count());
        });
    });
}

criterion_group!(benches, bench_write_1k_runs, bench_load_1k_runs);
criterion_main!(benches);
