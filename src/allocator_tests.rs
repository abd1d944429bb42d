//! Tests for the `allocator` module.

use super::*;
use crate::layout::slot_width;
use crate::record;
use tempfile::tempdir;

#[test]
fn allocate_assigns_increasing_slots_and_grows_high_water_mark() {
    let mut alloc = SlotAllocator::new();
    assert_eq!(alloc.allocate(1).unwrap(), 0);
    assert_eq!(alloc.allocate(2).unwrap(), 1);
    assert_eq!(alloc.high_water_mark(), 2);
}

#[test]
fn allocate_duplicate_id_is_an_error() {
    let mut alloc = SlotAllocator::new();
    alloc.allocate(1).unwrap();
    assert!(matches!(alloc.allocate(1), Err(Error::DuplicateId(1))));
}

#[test]
fn free_then_allocate_reuses_slot_before_growing() {
    let mut alloc = SlotAllocator::new();
    alloc.allocate(1).unwrap();
    alloc.allocate(2).unwrap();
    alloc.allocate(3).unwrap();

    let freed_slot = alloc.free(2).unwrap();
    assert_eq!(alloc.slot_for(2), None);

    let reused = alloc.allocate(4).unwrap();
    assert_eq!(reused, freed_slot);
    assert_eq!(alloc.high_water_mark(), 3);
}

#[test]
fn free_unknown_id_is_not_found() {
    let mut alloc = SlotAllocator::new();
    assert!(matches!(alloc.free(99), Err(Error::NotFound(99))));
}

#[test]
fn footer_round_trips_through_encode_decode() {
    let mut alloc = SlotAllocator::new();
    alloc.allocate(10).unwrap();
    alloc.allocate(20).unwrap();
    alloc.allocate(30).unwrap();
    alloc.free(20).unwrap();

    let encoded = alloc.encode_footer();
    let decoded = SlotAllocator::decode_footer(&encoded).unwrap();

    assert_eq!(decoded.high_water_mark(), alloc.high_water_mark());
    assert_eq!(decoded.slot_for(10), alloc.slot_for(10));
    assert_eq!(decoded.slot_for(30), alloc.slot_for(30));
    assert_eq!(decoded.slot_for(20), None);
    assert_eq!(decoded.live_count(), 2);
}

#[test]
fn decode_footer_rejects_bad_crc() {
    let mut alloc = SlotAllocator::new();
    alloc.allocate(1).unwrap();
    let mut encoded = alloc.encode_footer();
    let last = encoded.len() - 1;
    encoded[last] ^= 0xFF;
    assert!(SlotAllocator::decode_footer(&encoded).is_err());
}

#[test]
fn decode_footer_rejects_oversize_free_count_before_reading() {
    // A free_count that claims far more entries than the buffer could hold
    // must be rejected up front, not used to size a read loop.
    let mut alloc = SlotAllocator::new();
    alloc.allocate(1).unwrap();
    let mut encoded = alloc.encode_footer();

    // Overwrite the free_count field (right after magic + high_water_mark)
    // with an enormous bogus value.
    encoded[12..16].copy_from_slice(&u32::MAX.to_le_bytes());

    let err = SlotAllocator::decode_footer(&encoded).unwrap_err();
    assert!(matches!(err, Error::CorruptIndex(_)));
}

#[test]
fn rebuild_by_scan_recovers_mapping_from_slots() {
    let dir = tempdir().unwrap();
    let mut device = crate::device::BlockDevice::open(dir.path().join("store.bin")).unwrap();

    let width = slot_width(2, 16);
    let region_offset = 4096;

    let rec1 = record::encode(1, &[1.0, 2.0], b"a", width).unwrap();
    let rec2 = record::encode(2, &[3.0, 4.0], b"b", width).unwrap();
    device.write_at(region_offset, &rec1).unwrap();
    device.write_at(region_offset + width, &rec2).unwrap();

    let mut rec3 = record::encode(3, &[5.0, 6.0], b"c", width).unwrap();
    record::tombstone(&mut rec3);
    device.write_at(region_offset + 2 * width, &rec3).unwrap();

    let allocator = rebuild_by_scan(&mut device, region_offset, width, 3, 2).unwrap();

    assert_eq!(allocator.slot_for(1), Some(0));
    assert_eq!(allocator.slot_for(2), Some(1));
    assert_eq!(allocator.slot_for(3), None);
    assert_eq!(allocator.live_count(), 2);
    assert_eq!(allocator.high_water_mark(), 3);
}

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Allocate(u64),
        Free(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![(0u64..50).prop_map(Op::Allocate), (0u64..50).prop_map(Op::Free)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: `encode_footer`/`decode_footer` round-trips the
        /// mapping, free list, and high-water mark left by any sequence of
        /// allocate/free calls, including ones that error (duplicate id,
        /// unknown id) and are expected to leave no trace.
        #[test]
        fn prop_footer_round_trips_after_random_ops(ops in proptest::collection::vec(op_strategy(), 0usize..40)) {
            let mut alloc = SlotAllocator::new();
            for op in ops {
                match op {
                    Op::Allocate(id) => { let _ = alloc.allocate(id); }
                    Op::Free(id) => { let _ = alloc.free(id); }
                }
            }

            let encoded = alloc.encode_footer();
            let decoded = SlotAllocator::decode_footer(&encoded).unwrap();

            prop_assert_eq!(decoded.high_water_mark(), alloc.high_water_mark());
            prop_assert_eq!(decoded.live_count(), alloc.live_count());
            prop_assert_eq!(decoded.free_slot_count(), alloc.free_slot_count());
            for id in 0u64..50 {
                prop_assert_eq!(decoded.slot_for(id), alloc.slot_for(id));
            }
        }
    }
}
