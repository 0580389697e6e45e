//! Metaslab lifecycle, allocation strategies, the per-txg pipeline,
//! and condensation (spec §3 "Metaslab", §4.3, §4.4).
//!
//! A metaslab is one fixed-size slice of a device. It owns a free
//! range tree, a secondary by-size index for the strategies that need
//! one, a four-slot `alloc`/`free` ring plus a two-slot defer ring for
//! pipelining allocations against in-flight transaction groups, and
//! (once synced at least once) a backing [`msa_spacemap::SpaceMap`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod error;
mod handle;
mod metaslab;
mod pipeline;
mod size_index;
mod state;
mod strategy;

pub use error::MetaslabError;
pub use handle::MetaslabHandle;
pub use metaslab::{CondenseInfo, Metaslab, SyncDelta};
pub use pipeline::Pipeline;
pub use size_index::{SizeIndex, SizeIndexOps};
pub use state::{ActivationState, LoadState};
pub use strategy::{Cursors, Strategy};
