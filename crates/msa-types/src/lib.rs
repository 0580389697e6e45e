//! Core types and traits for the metaslab space allocator.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the workspace: strongly
//! typed IDs, the on-disk block pointer (`Dva`), the process-wide
//! tunable knobs, and the shared error type.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod dva;
pub mod error;
pub mod id;
pub mod tunables;

pub use dva::Dva;
pub use error::AllocError;
pub use id::{ClassId, GroupId, MetaslabId, Sense, Txg, TXG_CONCURRENT_STATES, TXG_DEFER_SIZE};
pub use tunables::Tunables;
