//! The metaslab itself: free tree, per-txg pipeline, lifecycle,
//! strategy, and condensation (spec §3 "Metaslab", §4.3, §4.4).

use std::sync::{Arc, Mutex};

use msa_rangetree::{NullOps, RangeTree, Segment};
use msa_spacemap::{ObjectStore, RecordKind, SpaceMap, SM_RUN_MAX};
use msa_types::{MetaslabId, Tunables, Txg, TXG_CONCURRENT_STATES};

use crate::error::MetaslabError;
use crate::pipeline::Pipeline;
use crate::size_index::{SizeIndex, SizeIndexOps};
use crate::state::{ActivationState, LoadState};
use crate::strategy::{Cursors, Strategy};

/// Counters handed back to the owning group/class after `sync_done`
/// (spec §4.3, `sync_done` step 2).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncDelta {
    /// Net change in allocated bytes this txg contributed to the space
    /// map's `allocated()` counter.
    pub alloc_delta: i64,
    /// Net change in in-flight deferred (freed-but-not-yet-reusable)
    /// bytes.
    pub defer_delta: i64,
}

/// A record of the most recent condense, kept as structured data rather
/// than printed — the original ZFS source emits this via `spa_dbgmsg`;
/// this workspace carries no logging crate (see `SPEC_FULL.md` §2), so
/// the equivalent diagnostic is a queryable field instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CondenseInfo {
    /// The txg during which the condense ran.
    pub txg: Txg,
    /// On-disk space-map length, in bytes, immediately before the
    /// condense.
    pub length_before: u64,
    /// On-disk space-map length, in bytes, immediately after.
    pub length_after: u64,
}

/// One power-of-two-sized slice of a device: the unit of allocation
/// bookkeeping (spec §3 "Metaslab").
pub struct Metaslab {
    id: MetaslabId,
    start: u64,
    size: u64,
    ashift: u32,
    ms_count: u64,

    strategy: Strategy,
    cursors: Cursors,

    free: RangeTree,
    size_index: Arc<Mutex<SizeIndex>>,
    pipeline: Pipeline,

    space_map: Option<SpaceMap>,
    load_state: LoadState,
    activation: ActivationState,
    condensing: bool,
    weight: u64,
    access_txg: Txg,
    alloc_delta_pending: i64,
    last_condense: Option<CondenseInfo>,
}

impl Metaslab {
    /// Construct a new, unloaded metaslab spanning
    /// `[id << ms_shift, (id + 1) << ms_shift)`, with no space-map
    /// object yet.
    pub fn new(id: MetaslabId, ms_shift: u32, ms_count: u64, ashift: u32, strategy: Strategy) -> Self {
        let size = 1u64 << ms_shift;
        let start = id.0 << ms_shift;
        let size_index = Arc::new(Mutex::new(SizeIndex::new()));
        let free = RangeTree::new(Box::new(SizeIndexOps(size_index.clone())));
        Self {
            id,
            start,
            size,
            ashift,
            ms_count,
            strategy,
            cursors: Cursors::new(),
            free,
            size_index,
            pipeline: Pipeline::new(),
            space_map: None,
            load_state: LoadState::Unloaded,
            activation: ActivationState::Inactive,
            condensing: false,
            weight: 0,
            access_txg: Txg(0),
            alloc_delta_pending: 0,
            last_condense: None,
        }
    }

    /// Attach a pre-existing space-map object (device reopen path,
    /// spec §6 "`vdev.ms_array[ms_id]`").
    pub fn attach_space_map(&mut self, object: u64) {
        self.space_map = Some(SpaceMap::new(object, self.start, self.size, self.ashift));
    }

    /// This metaslab's id.
    pub fn id(&self) -> MetaslabId {
        self.id
    }

    /// Byte offset of this metaslab's start.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Size of this metaslab in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current scalar sort weight (spec §4.3, "Weight"); `0` until the
    /// first [`refresh_weight`](Self::refresh_weight).
    pub fn weight(&self) -> u64 {
        self.weight
    }

    /// Current free-tree byte total. Authoritative only while
    /// [`load_state`](Self::load_state) is `Loaded`.
    pub fn free_bytes(&self) -> u64 {
        self.free.space()
    }

    /// Current load state.
    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    /// Current activation state.
    pub fn activation(&self) -> ActivationState {
        self.activation
    }

    /// Whether a condense is in progress (spec §4.4: "no allocation
    /// completes while condensing").
    pub fn is_condensing(&self) -> bool {
        self.condensing
    }

    /// Txg of the metaslab's last activity, used by [`sync_done`] to
    /// decide whether to unload an idle metaslab.
    ///
    /// [`sync_done`]: Self::sync_done
    pub fn access_txg(&self) -> Txg {
        self.access_txg
    }

    /// Record activity at `txg` without otherwise touching the
    /// metaslab, so a group's preload pool can keep a background-loaded
    /// metaslab from being unloaded on the very next `sync_done` (spec
    /// §4.5, "Preload": "with `access_txg` set so they do not
    /// immediately unload").
    pub fn touch(&mut self, txg: Txg) {
        if txg.0 > self.access_txg.0 {
            self.access_txg = txg;
        }
    }

    /// Structured record of the most recent condense, if any (spec §9
    /// ambient-stack note: surfaced as data rather than printed).
    pub fn last_condense(&self) -> Option<CondenseInfo> {
        self.last_condense
    }

    /// Replay the space map (if any) into a freshly emptied free tree
    /// spanning the full metaslab range (spec §4.3, `Unloaded →
    /// Loading → Loaded`).
    pub fn load(&mut self, store: &dyn ObjectStore) -> Result<(), MetaslabError> {
        self.begin_loading();
        let bytes = match &self.space_map {
            Some(sm) => match sm.read_raw(store) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    self.abort_loading();
                    return Err(e.into());
                }
            },
            None => None,
        };
        self.finish_load(bytes.as_deref()).inspect_err(|_| self.abort_loading())
    }

    /// The backing space-map object id, if one is attached yet.
    /// Exposed so a caller holding this metaslab behind an external
    /// lock can read the object id, drop the lock, and perform the
    /// object-store read itself (spec §5, "Suspension points").
    pub fn space_map_object(&self) -> Option<u64> {
        self.space_map.as_ref().map(|sm| sm.object())
    }

    /// Mark the metaslab `Loading` (spec §4.3, `Unloaded → Loading`),
    /// without yet touching the free tree. Paired with
    /// [`finish_load`](Self::finish_load) or
    /// [`abort_loading`](Self::abort_loading).
    pub fn begin_loading(&mut self) {
        self.load_state = LoadState::Loading;
    }

    /// Revert a `Loading` metaslab back to `Unloaded` after a failed
    /// object-store read, so a later caller retries the load instead of
    /// being stuck waiting on a load that will never complete.
    pub fn abort_loading(&mut self) {
        self.load_state = LoadState::Unloaded;
    }

    /// Replay already-read space-map bytes (or `None` if no space-map
    /// object is attached yet) into a freshly emptied free tree,
    /// completing `Loading → Loaded`. The non-I/O half of
    /// [`load`](Self::load): `bytes` is expected to have come from
    /// [`space_map_object`](Self::space_map_object)'s object via the
    /// caller's own (lock-released) object-store read.
    pub fn finish_load(&mut self, bytes: Option<&[u8]>) -> Result<(), MetaslabError> {
        self.free.vacate(None::<fn(Segment)>);
        self.free.add(self.start, self.size)?;
        if let (Some(sm), Some(bytes)) = (&self.space_map, bytes) {
            sm.replay(bytes, &mut self.free, msa_types::Sense::Free)?;
        }
        self.load_state = LoadState::Loaded;
        Ok(())
    }

    /// Drop the free tree to reclaim memory (spec §4.3, "unloaded after
    /// `unload_delay` idle txgs").
    pub fn unload(&mut self) {
        self.free.vacate(None::<fn(Segment)>);
        self.load_state = LoadState::Unloaded;
    }

    fn ensure_loaded(&mut self, store: &dyn ObjectStore) -> Result<(), MetaslabError> {
        if self.load_state != LoadState::Loaded {
            self.load(store)?;
        }
        Ok(())
    }

    /// Activate this metaslab for allocation, loading it first if
    /// necessary (spec §4.3, "Activation").
    pub fn activate(&mut self, store: &dyn ObjectStore, as_primary: bool) -> Result<(), MetaslabError> {
        self.ensure_loaded(store)?;
        self.set_activation(as_primary);
        Ok(())
    }

    /// Set the activation bit without touching load state, for callers
    /// (e.g. `MetaslabHandle::activate`) that have already ensured the
    /// metaslab is loaded themselves.
    pub fn set_activation(&mut self, as_primary: bool) {
        self.activation = if as_primary {
            ActivationState::ActivePrimary
        } else {
            ActivationState::ActiveSecondary
        };
    }

    /// Passivate this metaslab, resetting its weight to a
    /// caller-supplied value (typically the current largest free
    /// segment, so it remains sortable without the active-state bias).
    pub fn passivate(&mut self, new_weight: u64) {
        self.activation = ActivationState::Inactive;
        self.weight = new_weight;
    }

    /// Recompute `weight` per `metaslab_weight` (spec §4.3, "Weight"):
    /// `2·free − (id·free)/ms_count`, `+= weight_factor(histogram)` if
    /// enabled, `|= active_bits` if active.
    ///
    /// While loaded, `free` is the in-core free tree's total. Otherwise
    /// the free tree is empty and not authoritative, so `free` falls
    /// back to `size - space_map.allocated()` — the same space a load
    /// would reconstruct — so an unloaded-but-dirty metaslab still
    /// sorts correctly instead of collapsing to weight zero.
    pub fn compute_weight(&self, tunables: &Tunables) -> u64 {
        let free = if self.load_state == LoadState::Loaded {
            self.free.space()
        } else {
            self.size - self.space_map.as_ref().map_or(0, |sm| sm.allocated())
        };
        debug_assert!(self.id.0 < self.ms_count, "metaslab id must be < ms_count");
        let linear = 2u64
            .saturating_mul(free)
            .saturating_sub((self.id.0.saturating_mul(free)) / self.ms_count.max(1));
        let mut w = linear;
        if tunables.weight_factor_enable {
            let histogram_term = if self.load_state == LoadState::Loaded {
                self.free.histogram().weight_factor(self.ashift)
            } else {
                self.space_map.as_ref().map_or(0, |sm| sm.histogram().weight_factor(self.ashift))
            };
            w = w.saturating_add(histogram_term);
        }
        w | self.activation.active_bits()
    }

    /// Recompute and store `weight` (spec §4.3 `sync_done` step 6,
    /// "re-sort the metaslab... using the recomputed weight").
    pub fn refresh_weight(&mut self, tunables: &Tunables) {
        self.weight = self.compute_weight(tunables);
    }

    /// Whether this metaslab's strategy considers it fragmented (spec
    /// §4.3's `fragmented` column), used by the group sort.
    pub fn fragmented(&self, tunables: &Tunables) -> bool {
        self.strategy.fragmented(&self.free, self.size, tunables)
    }

    /// Allocate `size` bytes via this metaslab's strategy, removing the
    /// chosen range from the free tree and recording it in `alloc[t]`.
    pub fn alloc(&mut self, size: u64, txg: Txg, tunables: &Tunables) -> Result<u64, MetaslabError> {
        if self.condensing {
            return Err(MetaslabError::Busy);
        }
        if self.load_state != LoadState::Loaded {
            return Err(MetaslabError::Busy);
        }

        let offset = {
            let sizes = self.size_index.lock().unwrap();
            self.strategy
                .alloc(&self.free, &sizes, &mut self.cursors, size, self.size, tunables)
                .ok_or(MetaslabError::NoSpace)?
        };

        let sector = 1u64 << self.ashift;
        debug_assert_eq!(offset % sector, 0, "allocated offset must be sector-aligned");
        debug_assert_eq!(size % sector, 0, "allocated size must be sector-aligned");

        self.free.remove(offset, size)?;
        self.pipeline.alloc_mut(txg).add(offset, size)?;
        self.access_txg = txg;
        Ok(offset)
    }

    /// Undo an allocation before it has synced: re-add directly to the
    /// free tree (spec §4.3, "Free", branch (a) — "if now").
    pub fn free_now(&mut self, offset: u64, size: u64) -> Result<(), MetaslabError> {
        self.free.add(offset, size)?;
        Ok(())
    }

    /// Stage a free for the given txg, to be folded into the free tree
    /// `D` txgs after it becomes durable (spec §4.3, "Free", branch
    /// (b)).
    pub fn free(&mut self, offset: u64, size: u64, txg: Txg) -> Result<(), MetaslabError> {
        self.pipeline.free_mut(txg).add(offset, size)?;
        Ok(())
    }

    /// Replay-path claim: the block must currently be free; remove it
    /// and enqueue it into `alloc[t]` as if it had just been allocated
    /// (spec §4.6, "claim").
    pub fn claim(&mut self, offset: u64, size: u64, txg: Txg) -> Result<(), MetaslabError> {
        if !self.free.contains(offset, size) {
            return Err(MetaslabError::NotFound);
        }
        self.free.remove(offset, size)?;
        self.pipeline.alloc_mut(txg).add(offset, size)?;
        self.access_txg = txg;
        Ok(())
    }

    /// Whether `[offset, offset+size)` is currently in the live free
    /// tree — used by the facade's `claim` dry-run phase (spec §4.6,
    /// "verifies every copy is currently in the free tree").
    pub fn contains_free(&self, offset: u64, size: u64) -> bool {
        self.free.contains(offset, size)
    }

    /// Whether `[offset, offset+size)` appears anywhere in the live
    /// free tree or any free/defer staging tree — used by the facade's
    /// `check_free` debugging assertion (spec §4.6).
    pub fn free_or_deferred_contains(&self, offset: u64, size: u64) -> bool {
        if self.free.contains(offset, size) {
            return true;
        }
        for t in 0..TXG_CONCURRENT_STATES {
            if self.pipeline.free_at(Txg(t)).contains(offset, size) {
                return true;
            }
        }
        self.pipeline.defer_slots().iter().any(|d| d.contains(offset, size))
    }

    /// `should_condense()` (spec §4.4): the best-case encoding of the
    /// single largest free segment would not grow the space map, and
    /// the map is already large relative to its node count.
    ///
    /// The best-case entry count here deliberately uses the same
    /// (non-ceiling) division as the original: `size_sectors /
    /// min(size_sectors, SM_RUN_MAX)`, which slightly underestimates
    /// the word count for segments that are not an exact multiple of
    /// `SM_RUN_MAX` sectors. This is a size *estimate* used only to
    /// decide whether condensing is profitable, not the encoder itself
    /// (see `SpaceMap::words_for_len` for the real encoding).
    pub fn should_condense(&self, tunables: &Tunables) -> bool {
        let Some(sm) = &self.space_map else {
            return true;
        };
        let Some(largest) = self.free.largest() else {
            return true;
        };
        let size_sectors = largest.len() >> self.ashift;
        let divisor = size_sectors.min(SM_RUN_MAX).max(1);
        let entries = size_sectors / divisor;
        let segsz = entries * 8;
        let node_count = self.free.node_count() as u64;

        segsz <= sm.length() && sm.length() >= (tunables.condense_pct as u64 * 8 * node_count) / 100
    }

    /// Rewrite the space map in its minimal form (spec §4.4, steps
    /// 1–5). Blocks allocation for the duration via `condensing`.
    pub fn condense(&mut self, store: &mut dyn ObjectStore, txg: Txg) -> Result<(), MetaslabError> {
        let mut allocated_now = RangeTree::new(Box::new(NullOps));
        allocated_now.add(self.start, self.size)?;
        strip(&mut allocated_now, self.pipeline.free_at(txg))?;
        for defer in self.pipeline.defer_slots() {
            strip(&mut allocated_now, defer)?;
        }
        for t in 1..TXG_CONCURRENT_STATES {
            strip(&mut allocated_now, self.pipeline.alloc_future(txg, t))?;
        }

        self.condensing = true;
        let sm = self
            .space_map
            .as_mut()
            .expect("condense is only ever decided once a space map exists");
        let length_before = sm.length();
        let result = sm.condense(store, &allocated_now, &self.free);
        self.condensing = false;
        result?;
        self.last_condense = Some(CondenseInfo {
            txg,
            length_before,
            length_after: self.space_map.as_ref().unwrap().length(),
        });
        Ok(())
    }

    /// `sync(t)` (spec §4.3): append or condense this txg's staging
    /// trees into the space map, refresh the on-disk histogram, and
    /// rotate the free/freed trees.
    pub fn sync(
        &mut self,
        store: &mut dyn ObjectStore,
        txg: Txg,
        pass: u32,
        tunables: &Tunables,
    ) -> Result<(), MetaslabError> {
        if self.space_map.is_none() {
            let object = store.obj_alloc()?;
            self.space_map = Some(SpaceMap::new(object, self.start, self.size, self.ashift));
        }

        let allocated_before = self.space_map.as_ref().unwrap().allocated();

        let should_condense = self.load_state == LoadState::Loaded && pass == 1 && self.should_condense(tunables);
        if should_condense {
            self.condense(store, txg)?;
        } else {
            let sm = self.space_map.as_mut().unwrap();
            sm.write(store, self.pipeline.alloc_at(txg), RecordKind::Alloc)?;
            sm.write(store, self.pipeline.free_at(txg), RecordKind::Free)?;
        }

        let allocated_after = self.space_map.as_ref().unwrap().allocated();
        self.alloc_delta_pending += allocated_after as i64 - allocated_before as i64;

        self.pipeline.alloc_mut(txg).vacate(None::<fn(Segment)>);

        {
            let loaded = self.load_state == LoadState::Loaded;
            let free_at_txg_space = self.pipeline.free_at(txg).space();
            let sm = self.space_map.as_mut().unwrap();
            if loaded {
                sm.histogram_clear();
                sm.histogram_add(&self.free);
            } else if free_at_txg_space > 0 {
                sm.histogram_add(self.pipeline.free_at(txg));
            }
        }

        if pass == 1 {
            self.pipeline.swap_free_and_freed(txg);
        } else {
            self.pipeline.drain_free_into_freed(txg)?;
        }

        Ok(())
    }

    /// `sync_done(t)` (spec §4.3): roll the defer ring forward, push
    /// accounting deltas to the caller, and optionally unload.
    pub fn sync_done(&mut self, txg: Txg, tunables: &Tunables) -> Result<SyncDelta, MetaslabError> {
        let alloc_delta = self.alloc_delta_pending;
        self.alloc_delta_pending = 0;

        let defer_delta =
            self.pipeline.freed_at(txg).space() as i64 - self.pipeline.defer_slots()[txg.defer_slot()].space() as i64;

        self.pipeline.release_defer_into_free(&mut self.free, txg)?;
        self.pipeline.swap_freed_and_defer(txg);

        if let Some(sm) = &mut self.space_map {
            if self.load_state == LoadState::Loaded {
                sm.histogram_clear();
                sm.histogram_add(&self.free);
            }
        }

        if self.load_state == LoadState::Loaded
            && self.access_txg.0 < txg.0
            && (tunables.debug_unload || txg.0 - self.access_txg.0 > tunables.unload_delay)
        {
            self.unload();
        }

        self.refresh_weight(tunables);

        Ok(SyncDelta { alloc_delta, defer_delta })
    }
}

fn strip(into: &mut RangeTree, from: &RangeTree) -> Result<(), msa_rangetree::RangeTreeError> {
    let mut err = None;
    from.walk(|seg| {
        if err.is_none() {
            if let Err(e) = into.remove(seg.start, seg.len()) {
                err = Some(e);
            }
        }
    });
    match err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
