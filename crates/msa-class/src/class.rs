//! `MetaslabClass`: the rotor arena of metaslab groups and the
//! pool-wide aggregate counters (spec §3 "Metaslab class", §4.5
//! "Class rotor").

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use msa_group::MetaslabGroup;
use msa_types::GroupId;

use crate::error::ClassError;

/// One arena slot: the group itself (behind its own lock, since the
/// allocation hot path only needs shared access to the class) plus its
/// position in the rotor ring.
///
/// Grounded on spec §9's "Circular linked rotor" design note: instead
/// of a doubly-linked list of boxed nodes, the ring is an arena indexed
/// by `GroupId` with `next`/`prev` fields, avoiding interior references
/// entirely.
struct GroupSlot {
    group: Mutex<MetaslabGroup>,
    active: bool,
    next: GroupId,
    prev: GroupId,
}

/// A storage tier (e.g. "normal", "log") as a rotor of device groups,
/// with pool-wide aggregate accounting (spec §3 "Metaslab class").
pub struct MetaslabClass {
    is_normal: bool,
    groups: HashMap<GroupId, GroupSlot>,
    rotor: Mutex<Option<GroupId>>,
    aliquot: AtomicU64,
    alloc_groups: AtomicU64,
    alloc: AtomicI64,
    deferred: AtomicI64,
    space: AtomicI64,
    deflated_space: AtomicI64,
}

impl MetaslabClass {
    /// Construct an empty class. `is_normal` feeds
    /// [`MetaslabGroup::recompute_allocatable`]'s `mc != normal_class`
    /// clause (spec §4.5): every class other than the pool's primary
    /// "normal" tier always satisfies that clause.
    pub fn new(is_normal: bool) -> Self {
        Self {
            is_normal,
            groups: HashMap::new(),
            rotor: Mutex::new(None),
            aliquot: AtomicU64::new(0),
            alloc_groups: AtomicU64::new(0),
            alloc: AtomicI64::new(0),
            deferred: AtomicI64::new(0),
            space: AtomicI64::new(0),
            deflated_space: AtomicI64::new(0),
        }
    }

    /// Whether this is the pool's normal (primary) storage tier.
    pub fn is_normal(&self) -> bool {
        self.is_normal
    }

    /// `class_create`/`group_create` (spec §6, upward): add a group to
    /// the arena, inactive (not yet in the rotor).
    pub fn group_create(&mut self, group: MetaslabGroup) {
        let id = group.id();
        self.groups.insert(
            id,
            GroupSlot {
                group: Mutex::new(group),
                active: false,
                next: id,
                prev: id,
            },
        );
    }

    /// `group_destroy` (spec §6): remove a group from the arena
    /// entirely. The group must already be passivated.
    pub fn group_destroy(&mut self, id: GroupId) -> Result<MetaslabGroup, ClassError> {
        let slot = self.groups.get(&id).ok_or(ClassError::UnknownGroup(id))?;
        if slot.active {
            return Err(ClassError::AlreadyActive(id));
        }
        let slot = self.groups.remove(&id).unwrap();
        Ok(slot.group.into_inner().unwrap())
    }

    /// `group_activate` (spec §6): splice a group into the rotor ring
    /// and mark it eligible for allocation.
    pub fn group_activate(&mut self, id: GroupId) -> Result<(), ClassError> {
        {
            let slot = self.groups.get(&id).ok_or(ClassError::UnknownGroup(id))?;
            if slot.active {
                return Err(ClassError::AlreadyActive(id));
            }
        }

        let mut rotor = self.rotor.lock().unwrap();
        match *rotor {
            None => {
                let slot = self.groups.get_mut(&id).unwrap();
                slot.next = id;
                slot.prev = id;
                *rotor = Some(id);
            }
            Some(anchor) => {
                let next = self.groups.get(&anchor).unwrap().next;
                self.groups.get_mut(&anchor).unwrap().next = id;
                self.groups.get_mut(&next).unwrap().prev = id;
                let slot = self.groups.get_mut(&id).unwrap();
                slot.prev = anchor;
                slot.next = next;
            }
        }
        drop(rotor);

        let slot = self.groups.get_mut(&id).unwrap();
        slot.active = true;
        slot.group.lock().unwrap().activate();
        self.recompute_alloc_groups();
        Ok(())
    }

    /// `group_passivate` (spec §6): remove a group from the rotor ring
    /// without destroying it. Safe to call before device detach.
    pub fn group_passivate(&mut self, id: GroupId) -> Result<(), ClassError> {
        {
            let slot = self.groups.get(&id).ok_or(ClassError::UnknownGroup(id))?;
            if !slot.active {
                return Err(ClassError::NotActive(id));
            }
        }

        let (prev, next) = {
            let slot = self.groups.get(&id).unwrap();
            (slot.prev, slot.next)
        };

        let mut rotor = self.rotor.lock().unwrap();
        if prev == id {
            // sole member of the ring
            *rotor = None;
        } else {
            self.groups.get_mut(&prev).unwrap().next = next;
            self.groups.get_mut(&next).unwrap().prev = prev;
            if *rotor == Some(id) {
                *rotor = Some(next);
            }
        }
        drop(rotor);

        let slot = self.groups.get_mut(&id).unwrap();
        slot.next = id;
        slot.prev = id;
        slot.active = false;
        slot.group.lock().unwrap().passivate();
        self.recompute_alloc_groups();
        Ok(())
    }

    /// `class_validate` (spec §6): the rotor is `null` iff no group is
    /// active.
    pub fn validate(&self) -> Result<(), ClassError> {
        let active_count = self.groups.values().filter(|s| s.active).count();
        let rotor = *self.rotor.lock().unwrap();
        match (active_count, rotor) {
            (0, None) | (1.., Some(_)) => Ok(()),
            (0, Some(_)) => Err(ClassError::Invariant("rotor set with no active groups")),
            (1.., None) => Err(ClassError::Invariant("active groups exist but rotor is unset")),
        }
    }

    /// The group currently at the rotor position, if any.
    pub fn rotor_group(&self) -> Option<GroupId> {
        *self.rotor.lock().unwrap()
    }

    /// The group following `id` in the ring (spec §4.6, "the group
    /// following the previous copy's device").
    pub fn group_after(&self, id: GroupId) -> Option<GroupId> {
        self.groups.get(&id).map(|s| s.next)
    }

    /// Advance the rotor to the group following the current position
    /// (spec §4.5, "when the aliquot is exhausted, the rotor moves to
    /// `next`"), resetting the aliquot counter.
    pub fn advance_rotor(&self) {
        let mut rotor = self.rotor.lock().unwrap();
        if let Some(id) = *rotor {
            *rotor = self.groups.get(&id).map(|s| s.next);
        }
        self.aliquot.store(0, Ordering::Relaxed);
    }

    /// Run `f` against the group `id`, under that group's own lock.
    /// This is the class's hot-path accessor: callers never take a lock
    /// on the whole arena, only on the one group they touch (spec §5
    /// lock hierarchy: "Group lock: protects weight tree...").
    pub fn with_group<R>(&self, id: GroupId, f: impl FnOnce(&mut MetaslabGroup) -> R) -> Result<R, ClassError> {
        let slot = self.groups.get(&id).ok_or(ClassError::UnknownGroup(id))?;
        Ok(f(&mut slot.group.lock().unwrap()))
    }

    /// Recompute `alloc_groups` by scanning active slots (spec §4.5:
    /// group activation transitions "adjust `class.alloc_groups`").
    /// Recomputed rather than incrementally tracked so a group's
    /// `allocatable` flipping mid-rotor (via `reassess`) cannot drift
    /// the count out of sync; callers should invoke this after any
    /// `MetaslabGroup::reassess` that reports a change.
    pub fn recompute_alloc_groups(&self) {
        let count = self
            .groups
            .values()
            .filter(|s| s.active)
            .filter(|s| s.group.lock().unwrap().is_allocatable())
            .count();
        self.alloc_groups.store(count as u64, Ordering::Relaxed);
    }

    /// Count of currently allocatable active groups (spec §4.5's
    /// `class.alloc_groups == 0` last-resort clause).
    pub fn alloc_groups(&self) -> usize {
        self.alloc_groups.load(Ordering::Relaxed) as usize
    }

    /// Add `bytes` to the rotor's running aliquot counter (spec §4.5,
    /// "each allocation advances the rotor by `aliquot` bytes") and
    /// return the value *before* the add, so the caller can compare
    /// against `group.aliquot() + group.bias()` to decide whether to
    /// call [`advance_rotor`](Self::advance_rotor).
    ///
    /// Plain atomic fetch-add, no lock: spec §5 explicitly tolerates
    /// races here ("balance is statistical").
    pub fn bump_aliquot(&self, bytes: u64) -> u64 {
        self.aliquot.fetch_add(bytes, Ordering::Relaxed)
    }

    /// Apply an accounting delta to the four pool-wide counters (spec
    /// §3: "counters are monotone under `update(delta...)`" over the
    /// class's lifetime, though any individual delta may be negative,
    /// e.g. a free).
    pub fn update(&self, alloc_delta: i64, defer_delta: i64, space_delta: i64, deflated_delta: i64) {
        self.alloc.fetch_add(alloc_delta, Ordering::Relaxed);
        self.deferred.fetch_add(defer_delta, Ordering::Relaxed);
        self.space.fetch_add(space_delta, Ordering::Relaxed);
        self.deflated_space.fetch_add(deflated_delta, Ordering::Relaxed);
    }

    /// Total bytes currently allocated across the class.
    pub fn alloc_bytes(&self) -> i64 {
        self.alloc.load(Ordering::Relaxed)
    }

    /// Total bytes currently in defer rings across the class.
    pub fn deferred_bytes(&self) -> i64 {
        self.deferred.load(Ordering::Relaxed)
    }

    /// Total raw space across the class's devices.
    pub fn space(&self) -> i64 {
        self.space.load(Ordering::Relaxed)
    }

    /// Total space after RAID-Z/mirror deflation across the class.
    pub fn deflated_space(&self) -> i64 {
        self.deflated_space.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msa_group::SimpleDevice;
    use msa_metaslab::Strategy;

    fn group(id: u32) -> MetaslabGroup {
        let device = SimpleDevice::new(9, 16, 4);
        MetaslabGroup::new(GroupId(id), Box::new(device), Strategy::FirstFit)
    }

    #[test]
    fn validate_fails_if_rotor_and_active_count_disagree() {
        let class = MetaslabClass::new(true);
        assert!(class.validate().is_ok());
    }

    #[test]
    fn activating_a_lone_group_makes_it_its_own_ring() {
        let mut class = MetaslabClass::new(true);
        class.group_create(group(0));
        class.group_activate(GroupId(0)).unwrap();
        assert_eq!(class.rotor_group(), Some(GroupId(0)));
        assert_eq!(class.group_after(GroupId(0)), Some(GroupId(0)));
        assert_eq!(class.alloc_groups(), 1);
        class.validate().unwrap();
    }

    #[test]
    fn activating_three_groups_forms_a_ring() {
        let mut class = MetaslabClass::new(true);
        for i in 0..3 {
            class.group_create(group(i));
            class.group_activate(GroupId(i)).unwrap();
        }
        let mut seen = vec![class.rotor_group().unwrap()];
        for _ in 0..2 {
            seen.push(class.group_after(*seen.last().unwrap()).unwrap());
        }
        assert_eq!(class.group_after(*seen.last().unwrap()).unwrap(), seen[0]);
        assert_eq!(seen.len(), 3);
        assert_eq!(class.alloc_groups(), 3);
    }

    #[test]
    fn passivating_the_sole_group_clears_the_rotor() {
        let mut class = MetaslabClass::new(true);
        class.group_create(group(0));
        class.group_activate(GroupId(0)).unwrap();
        class.group_passivate(GroupId(0)).unwrap();
        assert_eq!(class.rotor_group(), None);
        assert_eq!(class.alloc_groups(), 0);
        class.validate().unwrap();
    }

    #[test]
    fn passivating_middle_of_ring_reconnects_neighbors() {
        let mut class = MetaslabClass::new(true);
        for i in 0..3 {
            class.group_create(group(i));
            class.group_activate(GroupId(i)).unwrap();
        }
        class.group_passivate(GroupId(1)).unwrap();
        class.validate().unwrap();
        assert_eq!(class.alloc_groups(), 2);
        // Ring now alternates strictly between the two survivors.
        let a = class.rotor_group().unwrap();
        let b = class.group_after(a).unwrap();
        assert_ne!(a, b);
        assert_eq!(class.group_after(b).unwrap(), a);
    }

    #[test]
    fn bump_aliquot_is_a_running_total_until_advance_resets_it() {
        let class = MetaslabClass::new(true);
        assert_eq!(class.bump_aliquot(100), 0);
        assert_eq!(class.bump_aliquot(50), 100);
        class.advance_rotor();
        assert_eq!(class.bump_aliquot(1), 0);
    }

    #[test]
    fn with_group_runs_against_the_named_group() {
        let mut class = MetaslabClass::new(true);
        class.group_create(group(0));
        let free_capacity = class
            .with_group(GroupId(0), |g| {
                g.recompute_free_capacity();
                g.free_capacity_pct()
            })
            .unwrap();
        assert_eq!(free_capacity, 100);
    }
}
