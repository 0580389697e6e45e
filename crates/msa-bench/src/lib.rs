//! Shared fixture builders for the metaslab allocator's benchmarks.
//!
//! Mirrors the teacher's `reference_profile`-style pattern: each
//! benchmark file builds its inputs from one of these functions rather
//! than duplicating setup code across `benches/*.rs`.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use msa_metaslab::{Metaslab, Strategy};
use msa_rangetree::{NullOps, RangeTree};
use msa_testkit::InMemoryObjectStore;
use msa_types::{MetaslabId, Tunables, Txg};

/// A single empty range tree of `size` bytes with no callback bundle,
/// the shape `msa-rangetree`'s own benches build against.
pub fn empty_tree() -> RangeTree {
    RangeTree::new(Box::new(NullOps))
}

/// A range tree containing `segments` evenly spaced, evenly sized
/// free runs across `[0, segments * stride)`, each `run_len` bytes,
/// separated by a `stride - run_len` gap.
pub fn fragmented_tree(segments: u64, run_len: u64, stride: u64) -> RangeTree {
    let mut tree = empty_tree();
    for i in 0..segments {
        tree.add(i * stride, run_len).unwrap();
    }
    tree
}

/// A freshly loaded metaslab of `1 << ms_shift` bytes under the given
/// strategy, activated and ready to allocate from — the fixture every
/// strategy benchmark starts from.
pub fn fresh_metaslab(ms_shift: u32, ashift: u32, strategy: Strategy) -> Metaslab {
    let mut ms = Metaslab::new(MetaslabId(0), ms_shift, 1, ashift, strategy);
    let store = InMemoryObjectStore::new();
    ms.activate(&store, true).unwrap();
    ms
}

/// Allocate `count` blocks of `size` bytes each from a fresh metaslab,
/// returning the metaslab with those blocks allocated at `txg`. Used to
/// build a "partially full" starting point for allocation benchmarks
/// without timing the fill itself.
pub fn filled_metaslab(ms_shift: u32, ashift: u32, strategy: Strategy, size: u64, count: u64) -> Metaslab {
    let mut ms = fresh_metaslab(ms_shift, ashift, strategy);
    let tunables = Tunables::default();
    for _ in 0..count {
        ms.alloc(size, Txg(1), &tunables).unwrap();
    }
    ms
}
