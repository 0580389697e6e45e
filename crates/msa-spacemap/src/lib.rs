//! The append-only on-disk space-map log (spec §4.2).
//!
//! A space map is a sequence of fixed-width, run-length-encoded records
//! mapped onto one metaslab's address range. Replaying the full record
//! sequence against an empty range tree reconstructs the committed
//! allocated (or free, depending on [`Sense`](msa_types::Sense)) set.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod object_store;
pub mod record;
mod spacemap;

pub use error::SpaceMapError;
pub use object_store::ObjectStore;
pub use record::{Record, RecordKind, SM_OFFSET_BITS, SM_RUN_BITS, SM_RUN_MAX};
pub use spacemap::SpaceMap;
