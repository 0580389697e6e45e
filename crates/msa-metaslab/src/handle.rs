//! `MetaslabHandle`: the shared `Mutex<Metaslab>` plus the load
//! condition variable that spec §5 requires alongside it.
//!
//! The metaslab lock must be released across the space-map read so one
//! metaslab's load I/O never serializes every other allocator thread
//! behind it (spec §5, "Suspension points"; "Load condition variable:
//! waited on under metaslab lock; broadcast by the loader"). The
//! condvar has to live next to the mutex rather than inside the
//! `Metaslab` it guards — `Condvar::wait` consumes the guard, so a
//! condvar reachable only through that same guard could never be
//! referenced across the wait.

use std::sync::{Condvar, Mutex, MutexGuard};

use msa_spacemap::ObjectStore;

use crate::error::MetaslabError;
use crate::metaslab::Metaslab;
use crate::state::LoadState;

/// A metaslab behind the lock (and load condvar) a group shares it
/// through.
pub struct MetaslabHandle {
    inner: Mutex<Metaslab>,
    load_cv: Condvar,
}

impl MetaslabHandle {
    /// Wrap a metaslab for shared access.
    pub fn new(metaslab: Metaslab) -> Self {
        Self {
            inner: Mutex::new(metaslab),
            load_cv: Condvar::new(),
        }
    }

    /// Lock the metaslab directly, for operations that never touch the
    /// load state machine (staging a free, reading weight, `claim`'s
    /// own internal activation, ...).
    pub fn lock(&self) -> MutexGuard<'_, Metaslab> {
        self.inner.lock().unwrap()
    }

    /// Ensure the metaslab is `Loaded`, returning the locked guard.
    ///
    /// Releases the metaslab lock across the object-store read: a
    /// `Loading` metaslab found by another caller is waited on via the
    /// load condvar instead of being read-raced or blocking that
    /// caller's own lock holders.
    pub fn ensure_loaded(&self, store: &dyn ObjectStore) -> Result<MutexGuard<'_, Metaslab>, MetaslabError> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            match guard.load_state() {
                LoadState::Loaded => return Ok(guard),
                LoadState::Loading => {
                    guard = self.load_cv.wait(guard).unwrap();
                }
                LoadState::Unloaded => {
                    guard.begin_loading();
                    let object = guard.space_map_object();
                    drop(guard);

                    let read = object.map(|obj| store.obj_read(obj)).transpose();

                    guard = self.inner.lock().unwrap();
                    match read {
                        Ok(bytes) => match guard.finish_load(bytes.as_deref()) {
                            Ok(()) => {
                                self.load_cv.notify_all();
                                return Ok(guard);
                            }
                            Err(e) => {
                                guard.abort_loading();
                                self.load_cv.notify_all();
                                return Err(e);
                            }
                        },
                        Err(e) => {
                            guard.abort_loading();
                            self.load_cv.notify_all();
                            return Err(e.into());
                        }
                    }
                }
            }
        }
    }

    /// Activate this metaslab for allocation, loading it first if
    /// necessary (spec §4.3, "Activation"), via [`ensure_loaded`].
    ///
    /// [`ensure_loaded`]: Self::ensure_loaded
    pub fn activate(&self, store: &dyn ObjectStore, as_primary: bool) -> Result<MutexGuard<'_, Metaslab>, MetaslabError> {
        let mut guard = self.ensure_loaded(store)?;
        guard.set_activation(as_primary);
        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;
    use msa_spacemap::{ObjectStore, RecordKind, SpaceMap};
    use msa_testkit::InMemoryObjectStore;
    use msa_types::MetaslabId;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn handle_with_space_map() -> (MetaslabHandle, InMemoryObjectStore) {
        let mut store = InMemoryObjectStore::new();
        let obj = store.obj_alloc().unwrap();
        let mut sm = SpaceMap::new(obj, 0, 4096, 9);
        let free = msa_rangetree::RangeTree::new(Box::new(msa_rangetree::NullOps));
        sm.write(&mut store, &free, RecordKind::Free).unwrap();

        let mut ms = Metaslab::new(MetaslabId(0), 12, 1, 9, Strategy::FirstFit);
        ms.attach_space_map(obj);
        (MetaslabHandle::new(ms), store)
    }

    #[test]
    fn ensure_loaded_transitions_unloaded_to_loaded() {
        let (handle, store) = handle_with_space_map();
        assert_eq!(handle.lock().load_state(), LoadState::Unloaded);
        let guard = handle.ensure_loaded(&store).unwrap();
        assert_eq!(guard.load_state(), LoadState::Loaded);
    }

    #[test]
    fn concurrent_activate_calls_observe_a_single_load() {
        let (handle, store) = handle_with_space_map();
        let handle = Arc::new(handle);
        let store: Arc<dyn ObjectStore> = Arc::new(store);
        let barrier = Arc::new(Barrier::new(4));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    handle.activate(store.as_ref(), true).unwrap();
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(handle.lock().load_state(), LoadState::Loaded);
    }
}
