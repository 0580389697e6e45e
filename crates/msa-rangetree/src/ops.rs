//! The callback bundle capability that lets upper layers observe every
//! mutation of a [`crate::RangeTree`] (spec §9, "Callback-driven range
//! tree").
//!
//! Instead of inheritance, the tree takes a small vtable at
//! construction. The metaslab supplies a bundle that mirrors every
//! add/remove into its size-ordered index; staging trees that need no
//! secondary index use [`NullOps`].

use crate::segment::Segment;

/// Mutation hooks invoked by a [`crate::RangeTree`] as its node set
/// changes.
///
/// `create`/`destroy` bracket the tree's own lifetime; `add`/`remove`
/// fire once per final (post-coalesce) segment change; `vacate` fires
/// once when the tree is emptied in bulk.
pub trait RangeTreeOps: std::fmt::Debug + Send {
    /// Called once when the owning tree is constructed.
    fn create(&mut self) {}

    /// Called once when the owning tree is dropped.
    fn destroy(&mut self) {}

    /// Called with the final, post-coalesce segment after an `add`,
    /// and with each residual segment after a `remove`.
    fn add(&mut self, seg: Segment);

    /// Called with a segment's prior extent whenever it is removed
    /// from the tree, including segments consumed by coalescing.
    fn remove(&mut self, seg: Segment);

    /// Called once when the tree is bulk-emptied via `vacate`.
    fn vacate(&mut self) {}
}

/// A no-op callback bundle for trees that need no secondary index
/// (the per-txg alloc/free staging trees, spec §4.1).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOps;

impl RangeTreeOps for NullOps {
    fn add(&mut self, _seg: Segment) {}
    fn remove(&mut self, _seg: Segment) {}
}
