//! The per-transaction-group staging trees: the `alloc[4]`/`free[4]`
//! ring, the `freed[4]` "written but not yet usable" ring, and the
//! `defer[2]` ring (spec §4.3, "Per-txg pipeline"; spec §9, "Per-txg
//! ring").

use msa_rangetree::{NullOps, RangeTree, RangeTreeError, Segment};
use msa_types::{Txg, TXG_CONCURRENT_STATES, TXG_DEFER_SIZE};

fn null_tree() -> RangeTree {
    RangeTree::new(Box::new(NullOps))
}

/// Walk `from` and add every one of its segments to `into`.
fn fold_into(into: &mut RangeTree, from: &RangeTree) -> Result<(), RangeTreeError> {
    let mut err = None;
    from.walk(|seg| {
        if err.is_none() {
            if let Err(e) = into.add(seg.start, seg.len()) {
                err = Some(e);
            }
        }
    });
    match err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// The four ring arrays threaded through a metaslab's sync pipeline.
///
/// None of these trees carry a size index — only the in-core free tree
/// does — so every slot uses [`NullOps`]; they are arrays rather than
/// `Vec`s so `sync`/`sync_done` never allocate.
pub struct Pipeline {
    alloc: [RangeTree; TXG_CONCURRENT_STATES as usize],
    free: [RangeTree; TXG_CONCURRENT_STATES as usize],
    freed: [RangeTree; TXG_CONCURRENT_STATES as usize],
    defer: [RangeTree; TXG_DEFER_SIZE as usize],
}

impl Pipeline {
    /// Construct the pipeline with every ring slot already present
    /// (spec §4.3 `sync_done` step 1: "newly initialized" trees are
    /// created eagerly here rather than lazily on first touch, which
    /// would need extra bookkeeping to detect the "not yet initialized"
    /// case).
    pub fn new() -> Self {
        Self {
            alloc: std::array::from_fn(|_| null_tree()),
            free: std::array::from_fn(|_| null_tree()),
            freed: std::array::from_fn(|_| null_tree()),
            defer: std::array::from_fn(|_| null_tree()),
        }
    }

    /// This txg's allocation-staging tree.
    pub fn alloc_mut(&mut self, txg: Txg) -> &mut RangeTree {
        &mut self.alloc[txg.pipeline_slot()]
    }

    /// Read-only view of this txg's allocation-staging tree.
    pub fn alloc_at(&self, txg: Txg) -> &RangeTree {
        &self.alloc[txg.pipeline_slot()]
    }

    /// This txg's free-staging tree.
    pub fn free_mut(&mut self, txg: Txg) -> &mut RangeTree {
        &mut self.free[txg.pipeline_slot()]
    }

    /// Read-only view of this txg's free-staging tree.
    pub fn free_at(&self, txg: Txg) -> &RangeTree {
        &self.free[txg.pipeline_slot()]
    }

    /// Read-only view of this txg's alloc slot `t` steps in the future
    /// (used by condensation to strip out-of-band future allocations).
    pub fn alloc_future(&self, txg: Txg, steps: u64) -> &RangeTree {
        &self.alloc[Txg(txg.0 + steps).pipeline_slot()]
    }

    /// Read-only view of the defer ring.
    pub fn defer_slots(&self) -> &[RangeTree; TXG_DEFER_SIZE as usize] {
        &self.defer
    }

    /// Read-only view of this txg's "written but not yet usable" tree.
    pub fn freed_at(&self, txg: Txg) -> &RangeTree {
        &self.freed[txg.pipeline_slot()]
    }

    /// Sync pass 1: swap `free[t]` with `freed[t]` in O(1) (spec §4.3,
    /// `sync` step 6).
    pub fn swap_free_and_freed(&mut self, txg: Txg) {
        let slot = txg.pipeline_slot();
        let Self { free, freed, .. } = self;
        free[slot].swap(&mut freed[slot]);
    }

    /// Sync pass > 1: drain `free[t]` into `freed[t]` rather than swap,
    /// since pass 1 already claimed the swap for this txg (spec §4.3,
    /// `sync` step 6).
    pub fn drain_free_into_freed(&mut self, txg: Txg) -> Result<(), RangeTreeError> {
        let slot = txg.pipeline_slot();
        let Self { free, freed, .. } = self;
        fold_into(&mut freed[slot], &free[slot])?;
        free[slot].vacate(None::<fn(Segment)>);
        Ok(())
    }

    /// Sync_done step 3, part one: move `defer[t mod D]` into `free`,
    /// making that space reusable.
    pub fn release_defer_into_free(&mut self, free: &mut RangeTree, txg: Txg) -> Result<(), RangeTreeError> {
        let slot = txg.defer_slot();
        fold_into(free, &self.defer[slot])?;
        self.defer[slot].vacate(None::<fn(Segment)>);
        Ok(())
    }

    /// Sync_done step 3, part two: swap `freed[t]` with `defer[t mod D]`
    /// in O(1), advancing the ring.
    pub fn swap_freed_and_defer(&mut self, txg: Txg) {
        let a = txg.pipeline_slot();
        let d = txg.defer_slot();
        let Self { freed, defer, .. } = self;
        freed[a].swap(&mut defer[d]);
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_free_and_freed_is_o1_pointer_exchange() {
        let mut p = Pipeline::new();
        let t = Txg(10);
        p.free_mut(t).add(0, 100).unwrap();
        p.swap_free_and_freed(t);
        assert_eq!(p.free_at(t).space(), 0);
        assert_eq!(p.freed_at(t).space(), 100);
    }

    #[test]
    fn drain_free_into_freed_empties_source() {
        let mut p = Pipeline::new();
        let t = Txg(3);
        p.free_mut(t).add(0, 50).unwrap();
        p.drain_free_into_freed(t).unwrap();
        assert_eq!(p.free_at(t).space(), 0);
        assert_eq!(p.freed_at(t).space(), 50);
    }

    #[test]
    fn release_defer_into_free_then_swap_advances_ring() {
        let mut p = Pipeline::new();
        let t = Txg(5);
        p.free_mut(t).add(100, 50).unwrap();
        p.swap_free_and_freed(t);

        let mut free = RangeTree::new(Box::new(NullOps));
        p.release_defer_into_free(&mut free, t).unwrap();
        assert_eq!(free.space(), 0); // defer ring started empty

        p.swap_freed_and_defer(t);
        p.release_defer_into_free(&mut free, t).unwrap();
        assert!(free.contains(100, 50));
    }
}
