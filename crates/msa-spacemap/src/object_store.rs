//! The downward "object store" collaborator (spec §6, "Downward").
//!
//! Space maps are append-only logs backed by an opaque object in the
//! pool's meta-object-set. This crate never implements the object
//! store itself — only the trait it calls through, so the space-map
//! layer can be tested against an in-memory fake (see
//! `msa-testkit::InMemoryObjectStore`).

use crate::error::SpaceMapError;

/// An opaque append-only object, addressed by `u64` id.
///
/// `Sync` (in addition to `Send`) so a pool can share one store across
/// the preload worker threads via `Arc<dyn ObjectStore>` — preload only
/// ever calls the `&self` read path (`obj_read`), never a mutating one,
/// so concurrent shared access is safe.
pub trait ObjectStore: Send + Sync {
    /// Allocate a new, empty object and return its id.
    fn obj_alloc(&mut self) -> Result<u64, SpaceMapError>;

    /// Append `bytes` at the current end of `obj`.
    fn obj_write(&mut self, obj: u64, bytes: &[u8]) -> Result<(), SpaceMapError>;

    /// Discard all bytes previously written to `obj`.
    fn obj_truncate(&mut self, obj: u64) -> Result<(), SpaceMapError>;

    /// Free `obj` entirely.
    fn obj_free(&mut self, obj: u64) -> Result<(), SpaceMapError>;

    /// Current length of `obj` in bytes.
    fn obj_bonus(&self, obj: u64) -> Result<u64, SpaceMapError>;

    /// Read the full contents of `obj`.
    fn obj_read(&self, obj: u64) -> Result<Vec<u8>, SpaceMapError>;
}
