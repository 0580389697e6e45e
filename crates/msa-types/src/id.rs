//! Strongly-typed identifiers used across the allocator workspace.

use std::fmt;

/// Number of concurrent in-flight transaction groups tracked per metaslab.
///
/// The `alloc`/`free` staging trees are arrays indexed by `txg %
/// TXG_CONCURRENT_STATES`; see spec §4.3 and §9 ("Per-txg ring").
pub const TXG_CONCURRENT_STATES: u64 = 4;

/// Size of the defer ring: the number of txgs a freed segment waits
/// before it becomes reusable (spec §3, "Defer ring", `D = 2`).
pub const TXG_DEFER_SIZE: u64 = 2;

/// A transaction group identifier.
///
/// An atomic unit of on-disk change. Monotonically increasing;
/// arithmetic helpers below compute the ring-slot indices used by the
/// per-txg pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Txg(pub u64);

impl Txg {
    /// Index into the 4-slot `alloc`/`free` ring for this txg.
    pub fn pipeline_slot(self) -> usize {
        (self.0 % TXG_CONCURRENT_STATES) as usize
    }

    /// Index into the 2-slot defer ring for this txg.
    pub fn defer_slot(self) -> usize {
        (self.0 % TXG_DEFER_SIZE) as usize
    }

    /// The txg `D` slots after this one, at which a free issued now
    /// becomes reusable (spec §4.3, §5 "Ordering guarantees").
    pub fn defer_target(self) -> Txg {
        Txg(self.0 + TXG_DEFER_SIZE)
    }

    /// Successor txg.
    pub fn next(self) -> Txg {
        Txg(self.0 + 1)
    }
}

impl fmt::Display for Txg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Txg {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies one metaslab within a device.
///
/// `MetaslabId(n)` is the n-th fixed-size slice of the device, starting
/// at byte offset `n << ms_shift` (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetaslabId(pub u64);

impl fmt::Display for MetaslabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MetaslabId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies one metaslab group (one top-level device) within a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for GroupId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a metaslab class (one storage tier, e.g. "normal" or "log").
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ClassId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Direction in which a space-map record is replayed into a range tree
/// (spec §4.2).
///
/// `Sense::Free` means "this space map describes a free set": `Alloc`
/// records remove from the target tree and `Free` records add to it.
/// `Sense::Alloc` is the mirror image, used when replaying into a tree
/// that should end up holding what is allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sense {
    /// Replay as if building a free set.
    Free,
    /// Replay as if building an allocated set.
    Alloc,
}
