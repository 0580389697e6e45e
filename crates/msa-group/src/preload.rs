//! The bounded background preload pool (spec §4.5, "Preload"; spec §9,
//! "Coroutine/async not required": "a fixed-size thread pool that takes
//! `(metaslab_id, class_id)` work items").
//!
//! Grounded on `murk-engine::tick_thread`'s own worker-thread shape:
//! a `crossbeam_channel` work queue, a `JoinHandle` per worker, and an
//! `AtomicBool` shutdown flag drained cooperatively rather than killed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use msa_metaslab::MetaslabHandle;
use msa_spacemap::ObjectStore;
use msa_types::{MetaslabId, Txg};

/// One unit of preload work: load `metaslab` in the background and
/// stamp it with `access_txg` so it is not immediately unloaded by the
/// next `sync_done` (spec §4.5).
struct PreloadJob {
    id: MetaslabId,
    metaslab: Arc<MetaslabHandle>,
    store: Arc<dyn ObjectStore>,
    txg: Txg,
}

/// A fixed-size background pool that loads metaslabs speculatively so
/// an `alloc` that later picks them does not block on I/O.
pub struct PreloadPool {
    sender: Sender<PreloadJob>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl PreloadPool {
    /// Spawn `worker_count` background threads draining a bounded work
    /// queue. `worker_count` is typically small (1-2): preload is a
    /// latency hedge, not a bulk loader.
    pub fn new(worker_count: usize) -> Self {
        let (sender, receiver): (Sender<PreloadJob>, Receiver<PreloadJob>) = crossbeam_channel::bounded(256);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(worker_count.max(1));
        for _ in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            let shutdown = shutdown.clone();
            workers.push(std::thread::spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    // `ensure_loaded` releases the metaslab lock across
                    // the space-map read (spec §5, "Suspension
                    // points"), so this background load never
                    // serializes a foreground allocator thread behind
                    // it. Best-effort: a failed background load just
                    // means the later foreground allocation pays the
                    // I/O cost itself; it must never panic the worker
                    // thread.
                    if let Ok(mut ms) = job.metaslab.ensure_loaded(job.store.as_ref()) {
                        ms.touch(job.txg);
                    }
                    let _ = job.id;
                }
            }));
        }
        Self {
            sender,
            shutdown,
            workers,
        }
    }

    /// Enqueue `metaslab` for background loading. Drops the job
    /// silently if the queue is full — preload is a hint, never a
    /// correctness requirement (a caller that needs `metaslab` loaded
    /// still calls `activate`, which loads synchronously if needed).
    pub fn submit(&self, id: MetaslabId, metaslab: Arc<MetaslabHandle>, store: Arc<dyn ObjectStore>, txg: Txg) {
        let _ = self.sender.try_send(PreloadJob {
            id,
            metaslab,
            store,
            txg,
        });
    }
}

impl Drop for PreloadPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msa_testkit::InMemoryObjectStore;
    use msa_types::MetaslabId as Id;
    use std::time::Duration;

    #[test]
    fn submitted_job_loads_the_metaslab_in_background() {
        let pool = PreloadPool::new(1);
        let ms = Arc::new(MetaslabHandle::new(msa_metaslab::Metaslab::new(
            Id(0),
            16,
            1,
            9,
            msa_metaslab::Strategy::FirstFit,
        )));
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());

        assert_eq!(ms.lock().load_state(), msa_metaslab::LoadState::Unloaded);
        pool.submit(Id(0), ms.clone(), store, Txg(3));

        let mut loaded = false;
        for _ in 0..200 {
            if ms.lock().load_state() == msa_metaslab::LoadState::Loaded {
                loaded = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(loaded, "background worker never loaded the metaslab");
        assert_eq!(ms.lock().access_txg(), Txg(3));
    }
}
