//! The allocator facade: the single entry point pools call into for
//! `alloc`, `free`, `claim`, and `check_free` (spec §4.6, §6).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod facade;
mod tx_manager;

pub use facade::{alloc, check_free, claim, free, AllocHint};
pub use tx_manager::{FixedTxManager, TxManager};
