//! Class with several equal groups: repeated single-copy allocations
//! should spread across devices rather than hammering one (spec §8
//! scenario 5, "Rotor spread").

use std::collections::HashSet;

use msa_alloc::alloc;
use msa_class::MetaslabClass;
use msa_group::{MetaslabGroup, SimpleDevice};
use msa_metaslab::Strategy;
use msa_testkit::InMemoryObjectStore;
use msa_types::{GroupId, Tunables, Txg};

fn class_with_groups(n: u32) -> MetaslabClass {
    let mut class = MetaslabClass::new(true);
    let tunables = Tunables::default();
    for i in 0..n {
        let device = SimpleDevice::new(9, 16, 8); // 64 KiB metaslabs, 256 each
        let mut group = MetaslabGroup::new(GroupId(i), Box::new(device), Strategy::FirstFit);
        for ms in 0..8 {
            group.metaslab_init(msa_types::MetaslabId(ms), None, &tunables);
        }
        class.group_create(group);
        class.group_activate(GroupId(i)).unwrap();
    }
    class
}

#[test]
fn four_single_copy_allocations_land_on_four_distinct_devices() {
    let class = class_with_groups(4);
    let store = InMemoryObjectStore::new();
    let tunables = Tunables::default();

    let mut vdevs = HashSet::new();
    for i in 0..4u64 {
        let dvas = alloc(&class, 128 * 1024, 1, Txg(i), None, &tunables, &store).unwrap();
        assert_eq!(dvas.len(), 1);
        vdevs.insert(dvas[0].vdev);
    }

    assert_eq!(vdevs.len(), 4, "expected all four allocations on distinct vdevs, got {vdevs:?}");
}
