//! The by-size secondary index a metaslab's free tree mirrors every
//! mutation into via its callback bundle (spec §3, "Range tree": "a
//! secondary balanced tree keyed by `(length, start)`"; spec §9,
//! "Callback-driven range tree").

use std::sync::{Arc, Mutex};

use std::collections::BTreeSet;

use msa_rangetree::{RangeTreeOps, Segment};

/// A `(length, start)`-ordered mirror of a range tree's node set.
///
/// The range tree itself never looks inside this; it only drives it
/// through [`SizeIndexOps`]. Strategies that need a best-fit or
/// smallest-fit query (dynamic-fit, cursor-fit, new-dynamic-fit) read
/// it directly alongside the free tree.
#[derive(Debug, Default)]
pub struct SizeIndex(BTreeSet<(u64, u64)>);

impl SizeIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Number of segments currently indexed.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the index holds no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The largest indexed segment, if any (cursor-fit's "select the
    /// largest region").
    pub fn largest(&self) -> Option<Segment> {
        self.0.iter().next_back().map(|&(len, start)| Segment::new(start, start + len))
    }

    /// The smallest segment whose length is at least `min_len`, if any
    /// (dynamic-fit's and new-dynamic-fit's best-fit fallback).
    pub fn smallest_at_least(&self, min_len: u64) -> Option<Segment> {
        self.0
            .range((min_len, 0)..)
            .next()
            .map(|&(len, start)| Segment::new(start, start + len))
    }

    /// Add one segment directly, bypassing the callback bundle.
    ///
    /// Exposed so callers that already have a free-standing `SizeIndex`
    /// (tests, and fixtures in `msa-testkit`) can populate it without
    /// constructing a whole range tree.
    pub fn insert(&mut self, seg: Segment) {
        self.0.insert((seg.len(), seg.start));
    }

    /// Remove one segment directly, bypassing the callback bundle.
    pub fn remove(&mut self, seg: Segment) {
        self.0.remove(&(seg.len(), seg.start));
    }
}

/// The callback bundle that keeps a [`SizeIndex`] in sync with a
/// [`msa_rangetree::RangeTree`]'s node set.
///
/// Wraps an `Arc<Mutex<_>>` rather than being owned outright because
/// the index must also be readable by the metaslab's strategy code
/// while the tree holds the bundle as a `Box<dyn RangeTreeOps>`.
#[derive(Debug, Clone)]
pub struct SizeIndexOps(pub Arc<Mutex<SizeIndex>>);

impl RangeTreeOps for SizeIndexOps {
    fn add(&mut self, seg: Segment) {
        self.0.lock().unwrap().insert(seg);
    }

    fn remove(&mut self, seg: Segment) {
        self.0.lock().unwrap().remove(seg);
    }

    fn vacate(&mut self) {
        self.0.lock().unwrap().0.clear();
    }
}
