//! Test utilities for allocator development: an in-memory
//! [`ObjectStore`] and a handful of small fixture builders.

use std::collections::HashMap;

use msa_spacemap::{ObjectStore, SpaceMapError};

/// A trivial in-memory [`ObjectStore`] backed by a `HashMap<u64, Vec<u8>>`.
///
/// Used by every crate's tests so none of them need a real object
/// store to exercise `load`/`write`/`truncate`.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: HashMap<u64, Vec<u8>>,
    next_id: u64,
}

impl InMemoryObjectStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            next_id: 1,
        }
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn obj_alloc(&mut self) -> Result<u64, SpaceMapError> {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(id, Vec::new());
        Ok(id)
    }

    fn obj_write(&mut self, obj: u64, bytes: &[u8]) -> Result<(), SpaceMapError> {
        self.objects.entry(obj).or_default().extend_from_slice(bytes);
        Ok(())
    }

    fn obj_truncate(&mut self, obj: u64) -> Result<(), SpaceMapError> {
        self.objects.entry(obj).or_default().clear();
        Ok(())
    }

    fn obj_free(&mut self, obj: u64) -> Result<(), SpaceMapError> {
        self.objects.remove(&obj);
        Ok(())
    }

    fn obj_bonus(&self, obj: u64) -> Result<u64, SpaceMapError> {
        Ok(self.objects.get(&obj).map(|v| v.len() as u64).unwrap_or(0))
    }

    fn obj_read(&self, obj: u64) -> Result<Vec<u8>, SpaceMapError> {
        Ok(self.objects.get(&obj).cloned().unwrap_or_default())
    }
}
