//! Single group, multiple copies: all copies of one block must land far
//! apart within the device (spec §8 scenario 6, "Copy distance").

use msa_alloc::alloc;
use msa_class::MetaslabClass;
use msa_group::{MetaslabGroup, SimpleDevice};
use msa_metaslab::Strategy;
use msa_testkit::InMemoryObjectStore;
use msa_types::{GroupId, MetaslabId, Tunables, Txg};

#[test]
fn three_copies_in_one_group_land_at_least_asize_shr_3_apart() {
    // 16 GiB device, ms_shift = 27 (128 MiB metaslabs) -> 128 metaslabs.
    let ms_shift = 27u32;
    let ms_count = 128u64;
    let device = SimpleDevice::new(9, ms_shift, ms_count);
    let asize_device = ms_count << ms_shift;

    let mut group = MetaslabGroup::new(GroupId(0), Box::new(device), Strategy::FirstFit);
    let tunables = Tunables::default();
    for ms in 0..ms_count {
        group.metaslab_init(MetaslabId(ms), None, &tunables);
    }

    let mut class = MetaslabClass::new(true);
    class.group_create(group);
    class.group_activate(GroupId(0)).unwrap();

    let store = InMemoryObjectStore::new();
    let dvas = alloc(&class, 4096, 3, Txg(1), None, &tunables, &store).unwrap();
    assert_eq!(dvas.len(), 3);

    let target_distance = asize_device >> tunables.initial_dshift;
    for i in 0..dvas.len() {
        for j in (i + 1)..dvas.len() {
            let distance = dvas[i].distance(&dvas[j]);
            assert!(
                distance >= target_distance,
                "copies {i} and {j} are only {distance} bytes apart, wanted >= {target_distance}"
            );
        }
    }
}
