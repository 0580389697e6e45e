//! The device-virtual-address block pointer.

use std::fmt;

use crate::id::GroupId;

/// `(vdev_id, offset, asize, gang_bit)` — a pointer to one physical copy
/// of a block (spec glossary, "DVA").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dva {
    /// Which device (metaslab group) this copy lives on.
    pub vdev: GroupId,
    /// Byte offset within the device.
    pub offset: u64,
    /// Allocated size in bytes (may exceed the requested `psize` due to
    /// device-specific rounding).
    pub asize: u64,
    /// Set when this copy is an indirect gang block rather than the
    /// data itself (spec glossary, "Gang block").
    pub gang: bool,
}

impl Dva {
    /// The metaslab index within `vdev` that owns `offset`, given the
    /// device's `ms_shift`.
    pub fn metaslab_index(&self, ms_shift: u32) -> u64 {
        self.offset >> ms_shift
    }

    /// Absolute distance between this DVA's offset and another's.
    ///
    /// Used by the facade's fault-domain spreading (spec §4.6, "Copy
    /// distance"): copies of the same block should land far apart
    /// within the same device.
    pub fn distance(&self, other: &Dva) -> u64 {
        self.offset.abs_diff(other.offset)
    }
}

impl fmt::Display for Dva {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dva({}, 0x{:x}, {}{})",
            self.vdev,
            self.offset,
            self.asize,
            if self.gang { ", gang" } else { "" }
        )
    }
}
