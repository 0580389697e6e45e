//! Space-map-specific error type.

use std::error::Error;
use std::fmt;
use std::io;

/// Errors raised while loading, writing, or truncating a space map.
#[derive(Debug)]
pub enum SpaceMapError {
    /// The backing object store failed.
    Io(io::Error),
    /// A record's `offset + len` fell outside the owning metaslab's
    /// address range.
    OutOfRange {
        /// The offending byte offset.
        offset: u64,
        /// The offending byte length.
        len: u64,
    },
    /// A record described a length too large to represent even after
    /// run splitting, or a corrupt word was encountered on load.
    Malformed {
        /// Description of the corruption.
        detail: String,
    },
}

impl fmt::Display for SpaceMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "space map I/O error: {e}"),
            Self::OutOfRange { offset, len } => {
                write!(f, "record [{offset}, {}) outside metaslab range", offset + len)
            }
            Self::Malformed { detail } => write!(f, "malformed space map: {detail}"),
        }
    }
}

impl Error for SpaceMapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SpaceMapError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
