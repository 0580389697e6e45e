//! The four allocation strategies and their switching conditions
//! (spec §4.3, "Strategies").

use msa_rangetree::RangeTree;
use msa_types::Tunables;

use crate::size_index::SizeIndex;

const LBA_BUCKETS: usize = 64;

/// Per-strategy cursor state threaded through a metaslab's lifetime
/// (spec §3, "per-strategy cursor array `lbas`").
///
/// First-fit and dynamic-fit index this array by alignment bucket
/// (`bucket = log2(size & -size)`); new-dynamic-fit indexes it by
/// `log2(size)`; cursor-fit uses only buckets 0 (cursor) and 1
/// (cursor_end). All four strategies share the same backing array, as
/// in the original: a metaslab only ever runs one strategy for its
/// entire lifetime, so the buckets never collide in practice.
#[derive(Clone, Debug)]
pub struct Cursors {
    lbas: [u64; LBA_BUCKETS],
}

impl Cursors {
    /// All cursors start at offset zero.
    pub fn new() -> Self {
        Self { lbas: [0; LBA_BUCKETS] }
    }

    fn bucket_of(x: u64) -> usize {
        debug_assert!(x > 0, "cursor bucket undefined for zero");
        (63 - x.leading_zeros()) as usize
    }
}

impl Default for Cursors {
    fn default() -> Self {
        Self::new()
    }
}

/// One of the four block-allocation policies (spec §4.3).
///
/// A metaslab is constructed with one strategy and keeps it for its
/// entire lifetime; the class vtable chooses it once per class, never
/// per allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Cursor-per-bucket forward scan with one wraparound.
    FirstFit,
    /// First-fit while the metaslab is roomy, best-fit once it is not.
    DynamicFit,
    /// Sequential allocation out of the single largest free region.
    CursorFit,
    /// Offset-tree hint lookup, falling back to a size-tree search for
    /// a region large enough to hold a clump of requests.
    NewDynamicFit,
}

impl Strategy {
    /// Pick an offset of `size` bytes out of `free`/`sizes`, or `None`
    /// if no segment can satisfy the request.
    pub fn alloc(
        self,
        free: &RangeTree,
        sizes: &SizeIndex,
        cursors: &mut Cursors,
        size: u64,
        ms_size: u64,
        tunables: &Tunables,
    ) -> Option<u64> {
        match self {
            Self::FirstFit => Self::first_fit(free, cursors, size),
            Self::DynamicFit => Self::dynamic_fit(free, sizes, cursors, size, ms_size, tunables),
            Self::CursorFit => Self::cursor_fit(sizes, cursors, size),
            Self::NewDynamicFit => Self::new_dynamic_fit(free, sizes, cursors, size, tunables),
        }
    }

    /// Whether the metaslab should be treated as fragmented by the
    /// group's weight sort (spec §4.3's `fragmented` column).
    pub fn fragmented(self, free: &RangeTree, ms_size: u64, tunables: &Tunables) -> bool {
        let max_seg = free.largest().map(|s| s.len()).unwrap_or(0);
        match self {
            Self::FirstFit => true,
            Self::DynamicFit => {
                !(max_seg >= tunables.df_alloc_threshold && free_pct(free, ms_size) >= tunables.df_free_pct as u64)
            }
            Self::CursorFit => max_seg < tunables.min_alloc_size,
            Self::NewDynamicFit => max_seg <= (tunables.min_alloc_size << tunables.ndf_clump_shift),
        }
    }

    fn first_fit(free: &RangeTree, cursors: &mut Cursors, size: u64) -> Option<u64> {
        let align = size & size.wrapping_neg();
        let bucket = Cursors::bucket_of(align);
        let (offset, new_cursor) = free.pick_from_cursor(cursors.lbas[bucket], size, align)?;
        cursors.lbas[bucket] = new_cursor;
        Some(offset)
    }

    fn dynamic_fit(
        free: &RangeTree,
        sizes: &SizeIndex,
        cursors: &mut Cursors,
        size: u64,
        ms_size: u64,
        tunables: &Tunables,
    ) -> Option<u64> {
        let max_size = free.largest().map(|s| s.len()).unwrap_or(0);
        if max_size < size {
            return None;
        }
        let align = size & size.wrapping_neg();
        let bucket = Cursors::bucket_of(align);

        if max_size >= tunables.df_alloc_threshold && free_pct(free, ms_size) >= tunables.df_free_pct as u64 {
            let (offset, new_cursor) = free.pick_from_cursor(cursors.lbas[bucket], size, align)?;
            cursors.lbas[bucket] = new_cursor;
            Some(offset)
        } else {
            cursors.lbas[bucket] = 0;
            sizes.smallest_at_least(size).map(|seg| seg.start)
        }
    }

    fn cursor_fit(sizes: &SizeIndex, cursors: &mut Cursors, size: u64) -> Option<u64> {
        if cursors.lbas[0] + size > cursors.lbas[1] {
            let largest = sizes.largest()?;
            if largest.len() < size {
                return None;
            }
            cursors.lbas[0] = largest.start;
            cursors.lbas[1] = largest.end;
        }
        let offset = cursors.lbas[0];
        cursors.lbas[0] += size;
        Some(offset)
    }

    fn new_dynamic_fit(
        free: &RangeTree,
        sizes: &SizeIndex,
        cursors: &mut Cursors,
        size: u64,
        tunables: &Tunables,
    ) -> Option<u64> {
        let max_size = free.largest().map(|s| s.len()).unwrap_or(0);
        if max_size < size {
            return None;
        }
        let bucket = Cursors::bucket_of(size);
        let hbit = bucket as u32 + 1;

        if let Some(seg) = free.segment_at(cursors.lbas[bucket]) {
            if seg.len() >= size {
                cursors.lbas[bucket] += size;
                return Some(seg.start);
            }
        }

        let clump_target = max_size.min(1u64.checked_shl(hbit + tunables.ndf_clump_shift).unwrap_or(u64::MAX));
        let seg = sizes.smallest_at_least(clump_target)?;
        if seg.len() < size {
            return None;
        }
        cursors.lbas[bucket] = seg.start + size;
        Some(seg.start)
    }
}

fn free_pct(free: &RangeTree, ms_size: u64) -> u64 {
    if ms_size == 0 {
        0
    } else {
        free.space() * 100 / ms_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msa_rangetree::{NullOps, RangeTree};

    fn tree_with(segs: &[(u64, u64)]) -> RangeTree {
        let mut t = RangeTree::new(Box::new(NullOps));
        for &(s, l) in segs {
            t.add(s, l).unwrap();
        }
        t
    }

    #[test]
    fn first_fit_wraps_after_exhausting_forward_search() {
        let t = tree_with(&[(0, 512), (2048, 1024)]);
        let mut cursors = Cursors::new();
        let off = Strategy::FirstFit.alloc(&t, &SizeIndex::new(), &mut cursors, 512, 4096, &Tunables::default());
        assert_eq!(off, Some(0));
    }

    #[test]
    fn cursor_fit_pins_to_largest_then_advances_sequentially() {
        // Reselection after the pinned region is fully consumed requires
        // the size index to shrink in step with real tree removals,
        // which `Metaslab::alloc` exercises end-to-end; this test only
        // covers the pin-then-advance behavior in isolation.
        use msa_rangetree::Segment;
        let mut sizes = SizeIndex::new();
        sizes.insert(Segment::new(0, 100));
        sizes.insert(Segment::new(1000, 1050));
        let mut cursors = Cursors::new();
        assert_eq!(Strategy::cursor_fit(&sizes, &mut cursors, 40), Some(0));
        assert_eq!(Strategy::cursor_fit(&sizes, &mut cursors, 40), Some(40));
        // A request too large for the remainder of the pinned window
        // falls through to `None` once no segment (pinned or not) fits.
        assert_eq!(Strategy::cursor_fit(&sizes, &mut cursors, 10_000), None);
    }

    #[test]
    fn dynamic_fit_switches_to_size_tree_when_fragmented() {
        use msa_rangetree::Segment;
        let free = tree_with(&[(0, 1000)]);
        let mut sizes = SizeIndex::new();
        sizes.insert(Segment::new(0, 1000));
        let mut tunables = Tunables::default();
        tunables.df_alloc_threshold = 2000; // forces the best-fit branch
        tunables.df_free_pct = 0;
        let mut cursors = Cursors::new();
        let off = Strategy::DynamicFit.alloc(&free, &sizes, &mut cursors, 100, 10_000, &tunables);
        assert_eq!(off, Some(0));
        assert!(Strategy::DynamicFit.fragmented(&free, 10_000, &tunables));
    }
}
