//! Errors raised by the metaslab-class layer (spec §7).

use std::error::Error;
use std::fmt;

use msa_group::GroupError;
use msa_types::{AllocError, GroupId};

/// Errors raised by [`crate::MetaslabClass`] operations.
#[derive(Debug)]
pub enum ClassError {
    /// An operation referenced a group the class does not own.
    UnknownGroup(GroupId),
    /// `group_activate` called on a group already in the rotor.
    AlreadyActive(GroupId),
    /// `group_passivate` called on a group not currently in the rotor.
    NotActive(GroupId),
    /// No group in the rotor could satisfy the request.
    NoSpace,
    /// `validate` found the rotor and the active-group count disagree.
    Invariant(&'static str),
    /// A group operation underneath the class failed.
    Group(GroupError),
}

impl fmt::Display for ClassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownGroup(id) => write!(f, "class does not own group {id}"),
            Self::AlreadyActive(id) => write!(f, "group {id} is already active in the rotor"),
            Self::NotActive(id) => write!(f, "group {id} is not active in the rotor"),
            Self::NoSpace => write!(f, "no group in the rotor satisfies the request"),
            Self::Invariant(msg) => write!(f, "class invariant violated: {msg}"),
            Self::Group(e) => write!(f, "{e}"),
        }
    }
}

impl Error for ClassError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Group(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GroupError> for ClassError {
    fn from(e: GroupError) -> Self {
        Self::Group(e)
    }
}

impl From<ClassError> for AllocError {
    fn from(e: ClassError) -> Self {
        match e {
            ClassError::UnknownGroup(id) => AllocError::Invalid {
                reason: format!("unknown group {id}"),
            },
            ClassError::AlreadyActive(id) => AllocError::Invalid {
                reason: format!("group {id} already active"),
            },
            ClassError::NotActive(id) => AllocError::Invalid {
                reason: format!("group {id} not active"),
            },
            ClassError::NoSpace => AllocError::NoSpace,
            ClassError::Invariant(msg) => AllocError::Invalid { reason: msg.to_string() },
            ClassError::Group(e) => AllocError::from(e),
        }
    }
}
