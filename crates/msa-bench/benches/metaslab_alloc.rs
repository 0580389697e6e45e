//! Criterion micro-benchmarks for per-strategy metaslab allocation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use msa_bench::{filled_metaslab, fresh_metaslab};
use msa_metaslab::Strategy;
use msa_types::{Tunables, Txg};

const MS_SHIFT: u32 = 24; // 16 MiB metaslab
const ASHIFT: u32 = 12; // 4 KiB sectors
const BLOCK: u64 = 4096;

fn strategies() -> [(&'static str, Strategy); 4] {
    [
        ("first_fit", Strategy::FirstFit),
        ("dynamic_fit", Strategy::DynamicFit),
        ("cursor_fit", Strategy::CursorFit),
        ("new_dynamic_fit", Strategy::NewDynamicFit),
    ]
}

fn bench_alloc_on_empty_metaslab(c: &mut Criterion) {
    let mut group = c.benchmark_group("metaslab_alloc_empty");
    for (name, strategy) in strategies() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &strategy, |b, &strategy| {
            let tunables = Tunables::default();
            b.iter(|| {
                let mut ms = fresh_metaslab(MS_SHIFT, ASHIFT, strategy);
                let offset = ms.alloc(black_box(BLOCK), Txg(1), &tunables).unwrap();
                black_box(offset);
            });
        });
    }
    group.finish();
}

fn bench_alloc_on_half_full_metaslab(c: &mut Criterion) {
    let mut group = c.benchmark_group("metaslab_alloc_half_full");
    let ms_size = 1u64 << MS_SHIFT;
    let fill_count = (ms_size / BLOCK) / 2;
    for (name, strategy) in strategies() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &strategy, |b, &strategy| {
            let tunables = Tunables::default();
            b.iter_batched(
                || filled_metaslab(MS_SHIFT, ASHIFT, strategy, BLOCK, fill_count),
                |mut ms| {
                    let offset = ms.alloc(black_box(BLOCK), Txg(1), &tunables).unwrap();
                    black_box(offset);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_alloc_on_empty_metaslab, bench_alloc_on_half_full_metaslab);
criterion_main!(benches);
