//! Metaslab classes: the rotor arena of device groups for one storage
//! tier, plus pool-wide aggregate accounting (spec §3 "Metaslab
//! class", §4.5 "Class rotor").

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod class;
mod error;

pub use class::MetaslabClass;
pub use error::ClassError;
