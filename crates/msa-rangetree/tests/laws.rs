//! Property tests for the range-tree laws in spec §8.

use msa_rangetree::{NullOps, RangeTree};
use proptest::prelude::*;

fn new_tree() -> RangeTree {
    RangeTree::new(Box::new(NullOps))
}

proptest! {
    /// Round-trip: `add(off,len); remove(off,len)` leaves the tree
    /// unchanged, for any sector-aligned interval added to an empty
    /// backing range.
    #[test]
    fn add_remove_round_trip(start in 0u64..1_000_000, len in 1u64..4096) {
        let mut t = new_tree();
        t.add(start, len).unwrap();
        t.remove(start, len).unwrap();
        prop_assert_eq!(t.node_count(), 0);
        prop_assert_eq!(t.space(), 0);
    }

    /// Adding two disjoint, non-adjacent segments never coalesces them.
    #[test]
    fn disjoint_segments_stay_separate(
        a_start in 0u64..1000, a_len in 1u64..100,
        gap in 1u64..100, b_len in 1u64..100,
    ) {
        let mut t = new_tree();
        let a_end = a_start + a_len;
        let b_start = a_end + gap;
        t.add(a_start, a_len).unwrap();
        t.add(b_start, b_len).unwrap();
        prop_assert_eq!(t.node_count(), 2);
        prop_assert_eq!(t.space(), a_len + b_len);
    }
}

#[test]
fn idempotent_vacate() {
    let mut t = new_tree();
    t.add(0, 4096).unwrap();
    t.vacate(None::<fn(msa_rangetree::Segment)>);
    t.vacate(None::<fn(msa_rangetree::Segment)>);
    assert_eq!(t.node_count(), 0);
}
