//! Errors raised by the metaslab-group layer (spec §7).

use std::error::Error;
use std::fmt;

use msa_metaslab::MetaslabError;
use msa_types::{AllocError, MetaslabId};

/// Errors raised by [`crate::MetaslabGroup`] operations.
#[derive(Debug)]
pub enum GroupError {
    /// No metaslab in the group could satisfy the request.
    NoSpace,
    /// A candidate metaslab was skipped because it is condensing or
    /// still loading; surfaced only when *every* candidate was busy.
    Busy,
    /// `group_remove`/`group_sort` referenced a metaslab the group does
    /// not own.
    UnknownMetaslab(MetaslabId),
    /// A metaslab operation underneath the group failed.
    Metaslab(MetaslabError),
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpace => write!(f, "no metaslab in group satisfies the request"),
            Self::Busy => write!(f, "every candidate metaslab is condensing or loading"),
            Self::UnknownMetaslab(id) => write!(f, "group does not own metaslab {id}"),
            Self::Metaslab(e) => write!(f, "{e}"),
        }
    }
}

impl Error for GroupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Metaslab(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MetaslabError> for GroupError {
    fn from(e: MetaslabError) -> Self {
        Self::Metaslab(e)
    }
}

impl From<GroupError> for AllocError {
    fn from(e: GroupError) -> Self {
        match e {
            GroupError::NoSpace => AllocError::NoSpace,
            GroupError::Busy => AllocError::Busy,
            GroupError::UnknownMetaslab(id) => AllocError::Invalid {
                reason: format!("unknown metaslab {id}"),
            },
            GroupError::Metaslab(e) => AllocError::from(e),
        }
    }
}
