//! The allocator facade: `alloc`, `free`, `claim`, `check_free` (spec
//! §4.6, §6 "Upward").

use std::sync::atomic::{AtomicU64, Ordering};

use msa_class::MetaslabClass;
use msa_group::{DeviceHandle, GroupError};
use msa_spacemap::ObjectStore;
use msa_types::{AllocError, Dva, GroupId, Tunables, Txg};
use smallvec::SmallVec;

/// Most callers request one to three copies (`ditto` blocks top out at
/// three in the original); inline storage avoids a heap allocation on
/// the common path without capping the number of copies a caller may
/// request.
type DvaVec = SmallVec<[Dva; 3]>;

/// A placement hint for `alloc` (spec §4.6, "if `hint` supplied").
#[derive(Clone, Copy, Debug)]
pub struct AllocHint {
    /// The prior copy to place relative to.
    pub dva: Dva,
    /// When set, start from the group *after* the hint's device rather
    /// than the hint's device itself (spec §4.6, "`HintAvoid`").
    pub avoid: bool,
}

static GANG_TICK: AtomicU64 = AtomicU64::new(0);

/// Spec §9's open question: whether the mod-4 trigger pattern is
/// intentional. Treated as a testing-only fault injector, gated behind
/// `Tunables::debug_gang_bang` (see `DESIGN.md`, "Open Questions
/// resolved"); it only flips the returned DVA's `gang` bit rather than
/// performing real gang-block splitting, which this workspace does not
/// implement.
fn maybe_force_gang(psize: u64, tunables: &Tunables) -> bool {
    if !tunables.debug_gang_bang || psize < tunables.gang_bang {
        return false;
    }
    let tick = GANG_TICK.fetch_add(1, Ordering::Relaxed);
    tick % 4 == 0
}

fn initial_group(class: &MetaslabClass, hint: Option<&AllocHint>) -> Option<GroupId> {
    match hint {
        Some(h) if h.avoid => class.group_after(h.dva.vdev),
        Some(h) => Some(h.dva.vdev),
        None => class.rotor_group(),
    }
}

/// Walk the rotor starting at `start`, trying each active group once,
/// stopping when we loop back to `start` (spec §4.6 step 3, "loop
/// around the rotor").
#[allow(clippy::too_many_arguments)]
fn attempt_copy(
    class: &MetaslabClass,
    start: GroupId,
    copy_index: usize,
    dshift: u32,
    initial_dshift: u32,
    psize: u64,
    txg: Txg,
    prior_offsets: &[u64],
    tunables: &Tunables,
    store: &dyn ObjectStore,
) -> Result<Dva, AllocError> {
    let mut current = start;
    loop {
        let outcome = class
            .with_group(current, |group| {
                let device = group.device();
                if !device.is_allocatable() || device.is_removing() {
                    return None;
                }
                if copy_index == 0 && device.has_write_errors() && dshift == initial_dshift {
                    return None;
                }
                let asize = device.psize_to_asize(psize);
                let min_distance = if dshift == 0 { 0 } else { device.asize() >> dshift };
                match group.group_alloc(asize, txg, min_distance, prior_offsets, tunables, store) {
                    Ok((offset, _)) => Some(Ok(Dva {
                        vdev: group.id(),
                        offset,
                        asize,
                        gang: false,
                    })),
                    Err(GroupError::NoSpace) | Err(GroupError::Busy) => None,
                    Err(e) => Some(Err(AllocError::from(e))),
                }
            })
            .map_err(AllocError::from)?;

        match outcome {
            Some(result) => return result,
            None => {
                let next = class.group_after(current).ok_or(AllocError::NoSpace)?;
                if next == start {
                    return Err(AllocError::NoSpace);
                }
                current = next;
            }
        }
    }
}

fn rollback(class: &MetaslabClass, dvas: &[Dva]) {
    for dva in dvas {
        let _ = class.with_group(dva.vdev, |g| g.undo_alloc(dva.offset, dva.asize));
    }
}

enum AttemptOutcome {
    NoSpace { distance_constrained: bool },
    Other(AllocError),
}

#[allow(clippy::too_many_arguments)]
fn attempt(
    class: &MetaslabClass,
    psize: u64,
    n_copies: usize,
    txg: Txg,
    hint: Option<&AllocHint>,
    tunables: &Tunables,
    store: &dyn ObjectStore,
    dshift: u32,
) -> Result<DvaVec, AttemptOutcome> {
    let mut dvas: DvaVec = SmallVec::new();
    let distance_constrained = dshift > 0;

    for d in 0..n_copies {
        let start = if d == 0 {
            initial_group(class, hint)
        } else {
            class.group_after(dvas[d - 1].vdev)
        };

        let Some(start) = start else {
            rollback(class, &dvas);
            return Err(AttemptOutcome::NoSpace { distance_constrained });
        };

        let prior_offsets: SmallVec<[u64; 3]> = dvas.iter().map(|dva| dva.offset).collect();
        match attempt_copy(
            class,
            start,
            d,
            dshift,
            tunables.initial_dshift,
            psize,
            txg,
            &prior_offsets,
            tunables,
            store,
        ) {
            Ok(mut dva) => {
                if maybe_force_gang(psize, tunables) {
                    dva.gang = true;
                }
                advance_rotor_if_due(class, &dva);
                dvas.push(dva);
            }
            Err(AllocError::NoSpace) => {
                rollback(class, &dvas);
                return Err(AttemptOutcome::NoSpace { distance_constrained });
            }
            Err(e) => {
                rollback(class, &dvas);
                return Err(AttemptOutcome::Other(e));
            }
        }
    }

    Ok(dvas)
}

/// Spec §4.6 step 3's closing bullet: "update `class.aliquot`; if
/// aliquot exceeded `group.aliquot + group.bias`, advance rotor."
fn advance_rotor_if_due(class: &MetaslabClass, dva: &Dva) {
    let Ok((group_aliquot, bias)) = class.with_group(dva.vdev, |g| (g.aliquot(), g.bias())) else {
        return;
    };
    let threshold = group_aliquot.saturating_add_signed(bias);
    let before = class.bump_aliquot(dva.asize);
    if before.saturating_add(dva.asize) > threshold {
        class.advance_rotor();
    }
}

/// `alloc(class, psize, n_copies, txg, hint?, flags) -> [Dva; n_copies]
/// | NoSpace` (spec §4.6).
///
/// Retries with a growing `min_distance` shift before surfacing
/// `NoSpace`, per step 4: "If all groups refused and any had non-zero
/// `min_distance`, increase `dshift` and retry from top." This
/// workspace has no separate I/O `scl` lock to escalate to (spec §1,
/// out of scope), so the dshift retry is the only escalation performed.
pub fn alloc(
    class: &MetaslabClass,
    psize: u64,
    n_copies: usize,
    txg: Txg,
    hint: Option<AllocHint>,
    tunables: &Tunables,
    store: &dyn ObjectStore,
) -> Result<Vec<Dva>, AllocError> {
    let mut dshift = tunables.initial_dshift;
    loop {
        match attempt(class, psize, n_copies, txg, hint.as_ref(), tunables, store, dshift) {
            Ok(dvas) => return Ok(dvas.into_vec()),
            Err(AttemptOutcome::Other(e)) => return Err(e),
            Err(AttemptOutcome::NoSpace { distance_constrained }) => {
                if distance_constrained && dshift < 32 {
                    dshift += 1;
                    continue;
                }
                return Err(AllocError::NoSpace);
            }
        }
    }
}

/// `free(blk, txg, now)` (spec §4.6): resolve each copy's owning
/// metaslab and stage the free. Never fails for valid input; an
/// unresolvable DVA is reported and otherwise ignored, since the block
/// is already unreachable and aborting would cascade (spec §7,
/// "Policy").
pub fn free(class: &MetaslabClass, dvas: &[Dva], txg: Txg) {
    for dva in dvas {
        let result = class.with_group(dva.vdev, |g| g.free(dva.offset, dva.asize, txg));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("msa-alloc: free of {dva} ignored: {e}"),
            Err(e) => eprintln!("msa-alloc: free of {dva} ignored: {e}"),
        }
    }
}

/// `claim(blk, txg)` (spec §4.6): a `txg == 0`-style dry run across
/// every copy before committing any of them, so a failure on one copy
/// never leaves an earlier copy half-claimed.
pub fn claim(class: &MetaslabClass, dvas: &[Dva], txg: Txg, store: &dyn ObjectStore) -> Result<(), AllocError> {
    for dva in dvas {
        let free = class.with_group(dva.vdev, |g| g.contains_free(dva.offset, dva.asize))??;
        if !free {
            return Err(AllocError::NotFound);
        }
    }
    for dva in dvas {
        class.with_group(dva.vdev, |g| g.claim(dva.offset, dva.asize, txg, store))??;
    }
    Ok(())
}

/// `check_free(blk)` (spec §4.6): debugging assertion that no copy lies
/// in the live free tree nor in any free/defer tree of its metaslab.
/// Returns `true` when the assertion holds.
pub fn check_free(class: &MetaslabClass, dvas: &[Dva]) -> bool {
    dvas.iter().all(|dva| {
        !class
            .with_group(dva.vdev, |g| g.free_or_deferred_contains(dva.offset, dva.asize))
            .map(|r| r.unwrap_or(false))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use msa_group::{MetaslabGroup, SimpleDevice};
    use msa_metaslab::Strategy;
    use msa_testkit::InMemoryObjectStore;
    use msa_types::MetaslabId;

    fn one_group_class(ms_count: u64) -> MetaslabClass {
        let device = SimpleDevice::new(9, 16, ms_count); // 64 KiB metaslabs
        let mut group = MetaslabGroup::new(GroupId(0), Box::new(device), Strategy::FirstFit);
        let tunables = Tunables::default();
        for ms in 0..ms_count {
            group.metaslab_init(MetaslabId(ms), None, &tunables);
        }
        let mut class = MetaslabClass::new(true);
        class.group_create(group);
        class.group_activate(GroupId(0)).unwrap();
        class
    }

    #[test]
    fn alloc_returns_one_dva_per_copy() {
        let class = one_group_class(4);
        let store = InMemoryObjectStore::new();
        let tunables = Tunables::default();
        let dvas = alloc(&class, 512, 2, Txg(1), None, &tunables, &store).unwrap();
        assert_eq!(dvas.len(), 2);
    }

    #[test]
    fn alloc_on_an_empty_rotor_is_no_space() {
        let class = MetaslabClass::new(true);
        let store = InMemoryObjectStore::new();
        let tunables = Tunables::default();
        let err = alloc(&class, 512, 1, Txg(1), None, &tunables, &store).unwrap_err();
        assert_eq!(err, AllocError::NoSpace);
    }

    #[test]
    fn free_stages_without_freeing_the_block_immediately() {
        let class = one_group_class(1);
        let store = InMemoryObjectStore::new();
        let tunables = Tunables::default();

        let dvas = alloc(&class, 512, 1, Txg(1), None, &tunables, &store).unwrap();
        assert!(check_free(&class, &dvas));

        free(&class, &dvas, Txg(2));
        // Staged in free[t], not yet folded back into the live free tree.
        assert!(!check_free(&class, &dvas));
    }

    #[test]
    fn claim_of_a_block_never_allocated_succeeds_and_marks_it_in_use() {
        let class = one_group_class(1);
        let store = InMemoryObjectStore::new();
        let dva = Dva {
            vdev: GroupId(0),
            offset: 0,
            asize: 512,
            gang: false,
        };
        claim(&class, &[dva], Txg(1), &store).unwrap();
        assert!(check_free(&class, &[dva]));
    }

    #[test]
    fn claim_of_an_already_allocated_block_fails_without_partial_effect() {
        let class = one_group_class(1);
        let store = InMemoryObjectStore::new();
        let tunables = Tunables::default();

        let dvas = alloc(&class, 512, 1, Txg(1), None, &tunables, &store).unwrap();
        let err = claim(&class, &dvas, Txg(2), &store).unwrap_err();
        assert_eq!(err, AllocError::NotFound);
    }

    #[test]
    fn maybe_force_gang_is_off_by_default() {
        let tunables = Tunables::default();
        assert!(!maybe_force_gang(64 * 1024 * 1024, &tunables));
    }
}
