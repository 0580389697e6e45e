//! Error types surfaced by the allocator core (spec §7).

use std::error::Error;
use std::fmt;
use std::io;

/// Errors surfaced by `alloc`/`free`/`claim`/`check_free` and the
/// layers beneath them.
#[derive(Debug)]
pub enum AllocError {
    /// The rotor was exhausted: no group could satisfy the request
    /// (`NoSpace`).
    NoSpace,
    /// The target metaslab is condensing or loading and the caller
    /// cannot wait (`Busy`).
    Busy,
    /// `claim` was called on a block that is not in the free set
    /// (`NotFound`).
    NotFound,
    /// The backing object store failed during load/write/truncate.
    /// Propagated unchanged from the `ObjectStore` collaborator.
    Io(io::Error),
    /// A misaligned offset/size or an out-of-range DVA (`Invalid`).
    Invalid {
        /// Human-readable description of what was invalid.
        reason: String,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpace => write!(f, "no space available"),
            Self::Busy => write!(f, "target is busy (loading or condensing)"),
            Self::NotFound => write!(f, "block not found in free set"),
            Self::Io(e) => write!(f, "object store I/O error: {e}"),
            Self::Invalid { reason } => write!(f, "invalid request: {reason}"),
        }
    }
}

impl Error for AllocError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for AllocError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl PartialEq for AllocError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NoSpace, Self::NoSpace) => true,
            (Self::Busy, Self::Busy) => true,
            (Self::NotFound, Self::NotFound) => true,
            (Self::Io(a), Self::Io(b)) => a.kind() == b.kind(),
            (Self::Invalid { reason: a }, Self::Invalid { reason: b }) => a == b,
            _ => false,
        }
    }
}
