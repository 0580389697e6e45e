//! The downward "device layer" collaborator (spec §6, "Downward"):
//! everything a metaslab group needs to know about the physical device
//! it sits on, without this workspace implementing vdevs itself (spec
//! §1, "Explicitly out of scope").

use std::fmt;

/// Per-device facts a [`crate::MetaslabGroup`] needs to size its
/// metaslabs, compute `free_capacity`, and decide allocatability.
///
/// A real pool implements this over its vdev type; tests and
/// `msa-testkit` implement it over a plain struct.
pub trait DeviceHandle: Send + Sync + fmt::Debug {
    /// `1 << ashift` is the device's minimum allocation unit (spec
    /// glossary, "Ashift").
    fn ashift(&self) -> u32;

    /// `1 << ms_shift` is the size in bytes of one metaslab on this
    /// device.
    fn ms_shift(&self) -> u32;

    /// Number of metaslabs this device is partitioned into.
    fn ms_count(&self) -> u64;

    /// Total allocatable capacity of the device, in bytes
    /// (`ms_count << ms_shift`, modulo any reserved tail).
    fn asize(&self) -> u64;

    /// Translate a logical (post-compression) size into the physical
    /// size this device must reserve for it (spec §6,
    /// `psize_to_asize`). Devices with no extra overhead return `psize`
    /// unchanged.
    fn psize_to_asize(&self, psize: u64) -> u64;

    /// Whether the device currently accepts allocations at all (not
    /// faulted, not write-degraded without override).
    fn is_allocatable(&self) -> bool;

    /// Whether the device is in the process of being removed from the
    /// pool — such a device never accepts new allocations even if
    /// otherwise healthy.
    fn is_removing(&self) -> bool;

    /// Whether the device has recorded write errors (spec §4.6: a
    /// device with write errors is skipped for the first copy when
    /// `dshift` is still at its initial value).
    fn has_write_errors(&self) -> bool;
}

/// A plain in-memory [`DeviceHandle`] for tests and simple pools that
/// have no real vdev layer beneath them.
#[derive(Clone, Debug)]
pub struct SimpleDevice {
    ashift: u32,
    ms_shift: u32,
    ms_count: u64,
    allocatable: bool,
    removing: bool,
    write_errors: bool,
}

impl SimpleDevice {
    /// Construct a healthy device of `ms_count` metaslabs, each
    /// `1 << ms_shift` bytes, with `1 << ashift`-byte sectors.
    pub fn new(ashift: u32, ms_shift: u32, ms_count: u64) -> Self {
        Self {
            ashift,
            ms_shift,
            ms_count,
            allocatable: true,
            removing: false,
            write_errors: false,
        }
    }

    /// Mark the device as faulted/unallocatable (for `allocatable`
    /// last-resort-clause tests).
    pub fn set_allocatable(&mut self, allocatable: bool) {
        self.allocatable = allocatable;
    }

    /// Mark the device as being removed.
    pub fn set_removing(&mut self, removing: bool) {
        self.removing = removing;
    }

    /// Mark the device as having recorded write errors.
    pub fn set_write_errors(&mut self, write_errors: bool) {
        self.write_errors = write_errors;
    }
}

impl DeviceHandle for SimpleDevice {
    fn ashift(&self) -> u32 {
        self.ashift
    }

    fn ms_shift(&self) -> u32 {
        self.ms_shift
    }

    fn ms_count(&self) -> u64 {
        self.ms_count
    }

    fn asize(&self) -> u64 {
        self.ms_count << self.ms_shift
    }

    fn psize_to_asize(&self, psize: u64) -> u64 {
        let sector = 1u64 << self.ashift;
        psize.div_ceil(sector) * sector
    }

    fn is_allocatable(&self) -> bool {
        self.allocatable
    }

    fn is_removing(&self) -> bool {
        self.removing
    }

    fn has_write_errors(&self) -> bool {
        self.write_errors
    }
}
