//! Metaslab groups: one device's worth of metaslabs kept in a
//! weight-ordered tree, plus background preload and device-level
//! allocatability (spec §3 "Metaslab group", §4.5).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod device;
mod error;
mod group;
mod preload;

pub use device::{DeviceHandle, SimpleDevice};
pub use error::GroupError;
pub use group::MetaslabGroup;
