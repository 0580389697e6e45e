//! Errors surfaced by the metaslab layer (spec §7).

use std::error::Error;
use std::fmt;

use msa_rangetree::RangeTreeError;
use msa_spacemap::SpaceMapError;
use msa_types::AllocError;

/// Errors raised by [`crate::Metaslab`] operations.
#[derive(Debug)]
pub enum MetaslabError {
    /// No segment satisfied the requested size.
    NoSpace,
    /// The metaslab is condensing or still loading.
    Busy,
    /// `free`/`claim`/`check_free` referenced a block not present where
    /// it was expected to be.
    NotFound,
    /// The backing space map or object store failed.
    SpaceMap(SpaceMapError),
    /// A range-tree invariant was violated — indicates corruption in
    /// the free set or one of the staging trees.
    RangeTree(RangeTreeError),
}

impl fmt::Display for MetaslabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpace => write!(f, "no segment satisfies the requested size"),
            Self::Busy => write!(f, "metaslab is condensing or loading"),
            Self::NotFound => write!(f, "block not found where expected"),
            Self::SpaceMap(e) => write!(f, "{e}"),
            Self::RangeTree(e) => write!(f, "{e}"),
        }
    }
}

impl Error for MetaslabError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SpaceMap(e) => Some(e),
            Self::RangeTree(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SpaceMapError> for MetaslabError {
    fn from(e: SpaceMapError) -> Self {
        Self::SpaceMap(e)
    }
}

impl From<RangeTreeError> for MetaslabError {
    fn from(e: RangeTreeError) -> Self {
        Self::RangeTree(e)
    }
}

impl From<MetaslabError> for AllocError {
    fn from(e: MetaslabError) -> Self {
        match e {
            MetaslabError::NoSpace => AllocError::NoSpace,
            MetaslabError::Busy => AllocError::Busy,
            MetaslabError::NotFound => AllocError::NotFound,
            MetaslabError::SpaceMap(e) => AllocError::Invalid { reason: e.to_string() },
            MetaslabError::RangeTree(e) => AllocError::Invalid { reason: e.to_string() },
        }
    }
}
