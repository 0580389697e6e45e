//! `MetaslabGroup`: the weight-ordered collection of metaslabs on one
//! device (spec §3 "Metaslab group", §4.5).

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use msa_metaslab::{Metaslab, MetaslabHandle, Strategy, SyncDelta};
use msa_spacemap::ObjectStore;
use msa_types::{GroupId, MetaslabId, Tunables, Txg};

use crate::device::DeviceHandle;
use crate::error::GroupError;
use crate::preload::PreloadPool;

/// Sort key for the weight-ordered tree: `(weight desc, start asc, id)`
/// (spec §4.5, "Metaslabs are kept in a balanced tree ordered by
/// `(weight desc, start asc)`"). `id` breaks ties between two
/// metaslabs that somehow share both weight and start (never happens
/// in practice, since starts are unique, but keeps the key strictly
/// ordered).
type WeightKey = (Reverse<u64>, u64, MetaslabId);

/// One device's worth of metaslabs, ordered by allocation priority
/// (spec §3 "Metaslab group").
pub struct MetaslabGroup {
    id: GroupId,
    device: Box<dyn DeviceHandle>,
    strategy: Strategy,
    metaslabs: BTreeMap<MetaslabId, Arc<MetaslabHandle>>,
    starts: HashMap<MetaslabId, u64>,
    weight_index: BTreeSet<WeightKey>,
    last_weight: HashMap<MetaslabId, u64>,
    activation_count: i64,
    allocated_bytes: u64,
    deferred_bytes: u64,
    free_capacity_pct: u8,
    allocatable: bool,
    aliquot: u64,
    bias: i64,
    preload: PreloadPool,
}

impl MetaslabGroup {
    /// Construct an empty group over `device`, with every metaslab
    /// using `strategy` for its entire lifetime (spec §4.3:
    /// "The strategy is chosen per class... and remains constant").
    pub fn new(id: GroupId, device: Box<dyn DeviceHandle>, strategy: Strategy) -> Self {
        Self {
            id,
            device,
            strategy,
            metaslabs: BTreeMap::new(),
            starts: HashMap::new(),
            weight_index: BTreeSet::new(),
            last_weight: HashMap::new(),
            activation_count: 0,
            allocated_bytes: 0,
            deferred_bytes: 0,
            free_capacity_pct: 100,
            allocatable: true,
            aliquot: 0,
            bias: 0,
            preload: PreloadPool::new(2),
        }
    }

    /// This group's id.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// The device this group sits on.
    pub fn device(&self) -> &dyn DeviceHandle {
        self.device.as_ref()
    }

    /// Number of metaslabs currently in the group.
    pub fn metaslab_count(&self) -> usize {
        self.metaslabs.len()
    }

    /// `metaslab_init` (spec §6, upward): construct metaslab `ms_id`
    /// sized per the group's device and add it to the group.
    pub fn metaslab_init(&mut self, ms_id: MetaslabId, sm_object: Option<u64>, tunables: &Tunables) {
        let mut ms = Metaslab::new(
            ms_id,
            self.device.ms_shift(),
            self.device.ms_count(),
            self.device.ashift(),
            self.strategy,
        );
        if let Some(obj) = sm_object {
            ms.attach_space_map(obj);
        }
        self.group_add(ms, tunables);
    }

    /// Insert an already-constructed metaslab into the weight-ordered
    /// tree (spec §4.5, `group_add`), O(log n).
    pub fn group_add(&mut self, mut ms: Metaslab, tunables: &Tunables) {
        let id = ms.id();
        let start = ms.start();
        ms.refresh_weight(tunables);
        let weight = ms.weight();
        self.metaslabs.insert(id, Arc::new(MetaslabHandle::new(ms)));
        self.starts.insert(id, start);
        self.weight_index.insert((Reverse(weight), start, id));
        self.last_weight.insert(id, weight);
    }

    /// Remove a metaslab from the group entirely (spec §4.5,
    /// `group_remove`), O(log n). Returns the removed metaslab's shared
    /// handle so the caller can finalize it (e.g. free its space-map
    /// object) before dropping it.
    pub fn group_remove(&mut self, id: MetaslabId) -> Result<Arc<MetaslabHandle>, GroupError> {
        let arc = self.metaslabs.remove(&id).ok_or(GroupError::UnknownMetaslab(id))?;
        if let Some(weight) = self.last_weight.remove(&id) {
            let start = self.starts.remove(&id).unwrap_or(0);
            self.weight_index.remove(&(Reverse(weight), start, id));
        }
        Ok(arc)
    }

    /// Recompute one metaslab's weight and re-position it in the
    /// weight-ordered tree (spec §4.5, `group_sort`), O(log n).
    pub fn group_sort(&mut self, id: MetaslabId, tunables: &Tunables) -> Result<(), GroupError> {
        let arc = self.metaslabs.get(&id).ok_or(GroupError::UnknownMetaslab(id))?.clone();
        let new_weight = {
            let mut ms = arc.lock();
            ms.refresh_weight(tunables);
            ms.weight()
        };
        self.reindex(id, new_weight);
        Ok(())
    }

    fn reindex(&mut self, id: MetaslabId, new_weight: u64) {
        let start = *self.starts.get(&id).unwrap_or(&0);
        if let Some(old_weight) = self.last_weight.insert(id, new_weight) {
            self.weight_index.remove(&(Reverse(old_weight), start, id));
        }
        self.weight_index.insert((Reverse(new_weight), start, id));
    }

    /// A shared handle to one metaslab, if the group owns it.
    pub fn metaslab(&self, id: MetaslabId) -> Option<Arc<MetaslabHandle>> {
        self.metaslabs.get(&id).cloned()
    }

    /// Metaslab ids in current weight order (highest weight first).
    /// Exposed for tests and diagnostics; `group_alloc` walks this
    /// order internally.
    pub fn weight_order(&self) -> Vec<MetaslabId> {
        self.weight_index.iter().map(|&(_, _, id)| id).collect()
    }

    /// Mark this group as actively supplying one more allocation copy
    /// (spec §3, "Metaslab group", `activation_count`).
    pub fn activate(&mut self) {
        self.activation_count += 1;
    }

    /// The inverse of [`activate`](Self::activate).
    ///
    /// Resolves spec §9's open question ("activation count going
    /// negative"): a caller that passivates more often than it
    /// activates indicates a bookkeeping bug upstream, but the group
    /// itself has no way to refuse the call, so it logs and clamps
    /// rather than leaving the count in a state no invariant expects.
    pub fn passivate(&mut self) {
        self.activation_count -= 1;
        if self.activation_count < 0 {
            eprintln!(
                "msa-group: activation_count for group {} went negative; clamping to 0",
                self.id
            );
            self.activation_count = 0;
        }
    }

    /// Current activation count.
    pub fn activation_count(&self) -> i64 {
        self.activation_count
    }

    /// Apply one metaslab's `sync_done` accounting delta to the
    /// group's running totals (spec §4.3 `sync_done` step 2: "push both
    /// to the device/class counters").
    pub fn apply_sync_delta(&mut self, delta: SyncDelta) {
        self.allocated_bytes = apply_delta(self.allocated_bytes, delta.alloc_delta);
        self.deferred_bytes = apply_delta(self.deferred_bytes, delta.defer_delta);
    }

    /// Total bytes currently allocated across this group's metaslabs.
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    /// Total bytes currently in the defer ring across this group's
    /// metaslabs.
    pub fn deferred_bytes(&self) -> u64 {
        self.deferred_bytes
    }

    /// Percentage of device capacity currently free.
    pub fn free_capacity_pct(&self) -> u8 {
        self.free_capacity_pct
    }

    /// Recompute `free_capacity_pct` from `allocated_bytes` against the
    /// device's total capacity.
    pub fn recompute_free_capacity(&mut self) {
        let asize = self.device.asize().max(1);
        let free = asize.saturating_sub(self.allocated_bytes);
        self.free_capacity_pct = ((free.saturating_mul(100)) / asize).min(100) as u8;
    }

    /// Whether this group currently accepts allocations (spec §4.5):
    /// `free_capacity > noalloc_threshold OR mc != normal_class OR
    /// class.alloc_groups == 0` — the last clause guarantees the
    /// allocator still makes progress when every group is starved.
    pub fn is_allocatable(&self) -> bool {
        self.allocatable
    }

    /// Recompute [`is_allocatable`](Self::is_allocatable); returns
    /// whether the flag changed (so the caller can adjust
    /// `class.alloc_groups`).
    pub fn recompute_allocatable(&mut self, tunables: &Tunables, is_normal_class: bool, class_alloc_groups: usize) -> bool {
        let new = self.free_capacity_pct > tunables.mg_noalloc_threshold || !is_normal_class || class_alloc_groups == 0;
        let changed = new != self.allocatable;
        self.allocatable = new;
        changed
    }

    /// This group's baseline rotor aliquot (spec §4.5, "weighted by
    /// device child count"); callers set this once per rotor cycle.
    pub fn aliquot(&self) -> u64 {
        self.aliquot
    }

    /// Set the baseline aliquot.
    pub fn set_aliquot(&mut self, aliquot: u64) {
        self.aliquot = aliquot;
    }

    /// This group's per-rotor-cycle utilization bias (spec §4.5,
    /// `bias = (pool_use% - device_use%) * aliquot / 100`).
    pub fn bias(&self) -> i64 {
        self.bias
    }

    /// Set the bias, recomputed once per rotor cycle by the class.
    pub fn set_bias(&mut self, bias: i64) {
        self.bias = bias;
    }

    /// Dispatch up to `tunables.preload_limit` of the highest-weight
    /// unloaded metaslabs to the background preload pool (spec §4.5,
    /// "Preload").
    pub fn preload_top(&self, tunables: &Tunables, store: Arc<dyn ObjectStore>, txg: Txg) {
        let mut dispatched = 0usize;
        for &(_, _, id) in self.weight_index.iter() {
            if dispatched >= tunables.preload_limit {
                break;
            }
            let Some(arc) = self.metaslabs.get(&id) else { continue };
            let already_loaded = arc.lock().load_state() == msa_metaslab::LoadState::Loaded;
            if !already_loaded {
                self.preload.submit(id, arc.clone(), store.clone(), txg);
                dispatched += 1;
            }
        }
    }

    /// `metaslab_sync_reassess` (spec §6, upward): recompute
    /// `free_capacity`/`allocatable` and re-trigger preload after a
    /// sync pass. Returns whether `allocatable` changed.
    pub fn reassess(
        &mut self,
        tunables: &Tunables,
        is_normal_class: bool,
        class_alloc_groups: usize,
        store: Arc<dyn ObjectStore>,
        txg: Txg,
    ) -> bool {
        self.recompute_free_capacity();
        let changed = self.recompute_allocatable(tunables, is_normal_class, class_alloc_groups);
        self.preload_top(tunables, store, txg);
        changed
    }

    /// `group_alloc` (spec §4.6): walk the weight-ordered tree,
    /// skipping metaslabs whose weight indicates insufficient space or
    /// that are condensing, enforcing the minimum distance from
    /// `prior_offsets` (earlier copies of the same block), activating
    /// and invoking the winning metaslab's strategy.
    ///
    /// `asize` is the already device-adjusted allocation size (spec
    /// §6, `psize_to_asize`); the caller is expected to have applied
    /// that translation before calling in.
    pub fn group_alloc(
        &mut self,
        asize: u64,
        txg: Txg,
        min_distance: u64,
        prior_offsets: &[u64],
        tunables: &Tunables,
        store: &dyn ObjectStore,
    ) -> Result<(u64, MetaslabId), GroupError> {
        let candidates: Vec<MetaslabId> = self.weight_order();
        let mut saw_any = false;
        let mut busy_count = 0usize;

        for id in candidates {
            let Some(arc) = self.metaslabs.get(&id).cloned() else { continue };
            saw_any = true;

            {
                let ms = arc.lock();
                if ms.is_condensing() {
                    busy_count += 1;
                    continue;
                }
                if ms.weight() < asize {
                    continue;
                }
                if min_distance > 0 && !prior_offsets.is_empty() {
                    let start = ms.start();
                    let end = start + ms.size();
                    let far_enough = prior_offsets.iter().all(|&p| {
                        if p < start {
                            start - p >= min_distance
                        } else if p >= end {
                            p - end >= min_distance
                        } else {
                            false
                        }
                    });
                    if !far_enough {
                        continue;
                    }
                }
            }

            // `activate` releases the metaslab lock across the
            // space-map load I/O (spec §5, "Suspension points"), so it
            // is called without holding the guard checked above.
            let mut ms = match arc.activate(store, true) {
                Ok(ms) => ms,
                Err(_) => {
                    busy_count += 1;
                    continue;
                }
            };

            match ms.alloc(asize, txg, tunables) {
                Ok(offset) => {
                    if min_distance > 0 && prior_offsets.iter().any(|&p| offset.abs_diff(p) < min_distance) {
                        let _ = ms.free_now(offset, asize);
                        continue;
                    }
                    ms.refresh_weight(tunables);
                    let new_weight = ms.weight();
                    drop(ms);
                    self.reindex(id, new_weight);
                    return Ok((offset, id));
                }
                Err(msa_metaslab::MetaslabError::NoSpace) => continue,
                Err(msa_metaslab::MetaslabError::Busy) => {
                    busy_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if saw_any && busy_count > 0 && busy_count == self.metaslabs.len() {
            Err(GroupError::Busy)
        } else {
            Err(GroupError::NoSpace)
        }
    }
}

impl MetaslabGroup {
    fn metaslab_at(&self, offset: u64) -> Result<Arc<MetaslabHandle>, GroupError> {
        let id = MetaslabId(offset >> self.device.ms_shift());
        self.metaslabs.get(&id).cloned().ok_or(GroupError::UnknownMetaslab(id))
    }

    /// Undo a not-yet-synced allocation (spec §4.3, "Free", branch (a)):
    /// used by the facade to roll back earlier copies of a block when a
    /// later copy in the same request fails.
    pub fn undo_alloc(&self, offset: u64, size: u64) -> Result<(), GroupError> {
        self.metaslab_at(offset)?.lock().free_now(offset, size)?;
        Ok(())
    }

    /// Stage a free for `txg` against whichever metaslab owns `offset`
    /// (spec §4.6, `free`: "resolve `metaslab = vd.ms[offset >>
    /// ms_shift]` and call `metaslab.free(...)`").
    pub fn free(&self, offset: u64, size: u64, txg: Txg) -> Result<(), GroupError> {
        self.metaslab_at(offset)?.lock().free(offset, size, txg)?;
        Ok(())
    }

    /// Replay-path claim against whichever metaslab owns `offset` (spec
    /// §4.6, `claim`: "activates the metaslab secondary, then removes
    /// each copy and enqueues it into `alloc[t]`"). `activate` releases
    /// the metaslab lock across the load I/O (spec §5).
    pub fn claim(&self, offset: u64, size: u64, txg: Txg, store: &dyn ObjectStore) -> Result<(), GroupError> {
        let arc = self.metaslab_at(offset)?;
        let mut ms = arc.activate(store, false)?;
        ms.claim(offset, size, txg)?;
        Ok(())
    }

    /// Whether `[offset, offset+size)` is currently in the live free
    /// tree, without mutating anything (spec §4.6, `claim`'s dry-run
    /// phase).
    pub fn contains_free(&self, offset: u64, size: u64) -> Result<bool, GroupError> {
        Ok(self.metaslab_at(offset)?.lock().contains_free(offset, size))
    }

    /// Whether `[offset, offset+size)` appears in the live free tree or
    /// any free/defer staging tree of whichever metaslab owns it (spec
    /// §4.6, `check_free`).
    pub fn free_or_deferred_contains(&self, offset: u64, size: u64) -> Result<bool, GroupError> {
        Ok(self.metaslab_at(offset)?.lock().free_or_deferred_contains(offset, size))
    }
}

fn apply_delta(base: u64, delta: i64) -> u64 {
    if delta >= 0 {
        base.saturating_add(delta as u64)
    } else {
        base.saturating_sub(delta.unsigned_abs())
    }
}
