//! A balanced ordered set of non-overlapping, coalesced half-open
//! intervals, with a pluggable callback bundle for observing mutations.
//!
//! This is the leaf data structure beneath the metaslab's free set and
//! its per-txg staging trees (spec §2, §4.1). The tree itself never
//! maintains a size-ordered index; callers that need one (the
//! metaslab's free tree) supply a [`RangeTreeOps`] bundle that mirrors
//! every mutation into their own structure.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod histogram;
mod ops;
mod segment;
mod tree;

pub use histogram::Histogram;
pub use ops::{NullOps, RangeTreeOps};
pub use segment::Segment;
pub use tree::{RangeTree, RangeTreeError};
