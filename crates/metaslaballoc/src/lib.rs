//! A ZFS-style metaslab space allocator.
//!
//! This crate re-exports the public surface of each sub-crate under a
//! short module alias, and a [`prelude`] for the common case of pulling
//! in the types needed to build a class, a group, and a device and call
//! into the facade in [`alloc`].
//!
//! | Module | Sub-crate | Covers |
//! | --- | --- | --- |
//! | [`types`] | `msa-types` | IDs, [`types::Dva`], [`types::Tunables`], [`types::AllocError`] |
//! | [`rangetree`] | `msa-rangetree` | The ordered free-segment set beneath a metaslab |
//! | [`spacemap`] | `msa-spacemap` | The on-disk append-only allocation log |
//! | [`metaslab`] | `msa-metaslab` | Metaslab lifecycle, strategies, the per-txg pipeline |
//! | [`group`] | `msa-group` | One device's metaslabs, preload, device allocatability |
//! | [`class`] | `msa-class` | The rotor arena of groups for one storage tier |
//! | [`alloc`] | `msa-alloc` | The `alloc`/`free`/`claim`/`check_free` facade |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and traits: IDs, [`types::Dva`], [`types::Tunables`], [`types::AllocError`].
pub use msa_types as types;

/// The free-segment range tree beneath a metaslab (`msa-rangetree`).
pub use msa_rangetree as rangetree;

/// The on-disk append-only space-map log (`msa-spacemap`).
pub use msa_spacemap as spacemap;

/// Metaslab lifecycle, allocation strategies, and the per-txg pipeline
/// (`msa-metaslab`).
pub use msa_metaslab as metaslab;

/// Metaslab groups: one device's metaslabs, preload, and device
/// allocatability (`msa-group`).
pub use msa_group as group;

/// Metaslab classes: the rotor arena of groups for one storage tier
/// (`msa-class`).
pub use msa_class as class;

/// The allocator facade: `alloc`, `free`, `claim`, `check_free`
/// (`msa-alloc`).
pub use msa_alloc as alloc;

/// Common imports for typical use of this allocator.
///
/// ```rust
/// use metaslaballoc::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use msa_types::{
        AllocError, ClassId, Dva, GroupId, MetaslabId, Sense, Tunables, Txg,
        TXG_CONCURRENT_STATES, TXG_DEFER_SIZE,
    };

    // Range tree
    pub use msa_rangetree::{NullOps, RangeTree, RangeTreeError, RangeTreeOps, Segment};

    // Space map
    pub use msa_spacemap::{ObjectStore, Record, RecordKind, SpaceMap, SpaceMapError};

    // Metaslab
    pub use msa_metaslab::{
        ActivationState, CondenseInfo, LoadState, Metaslab, MetaslabError, Pipeline, Strategy,
        SyncDelta,
    };

    // Group
    pub use msa_group::{DeviceHandle, GroupError, MetaslabGroup, SimpleDevice};

    // Class
    pub use msa_class::{ClassError, MetaslabClass};

    // Allocator facade
    pub use msa_alloc::{alloc, check_free, claim, free, AllocHint, FixedTxManager, TxManager};
}
