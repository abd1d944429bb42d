//! Tests for the `Store` façade.

use super::*;
use crate::config::StoreConfig;
use tempfile::tempdir;

fn axis(dimension: usize, i: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dimension];
    v[i] = 1.0;
    v
}

fn perturb(base: &[f32], seed: f32) -> Vec<f32> {
    base.iter().enumerate().map(|(i, x)| x + (seed * (i as f32 + 1.0)).sin() * 0.001).collect()
}

fn open(path: &std::path::Path, d: usize, k: usize) -> Store {
    Store::initialize(path, ClusteringStrategy::KMeans, d, k, StoreConfig::default()).unwrap()
}

#[test]
fn store_and_retrieve_round_trip_returns_bit_identical_vector() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let mut store = open(&path, 8, 4);

    let vector = axis(8, 0);
    store.store_vector(7, &vector, b"a").unwrap();

    assert_eq!(store.retrieve_vector(7).unwrap(), Some(vector));
    assert_eq!(store.get_vector_metadata(7).unwrap(), Some(b"a".to_vec()));
}

#[test]
fn delete_then_reuse_drains_free_list_before_growth() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let mut store = open(&path, 4, 2);

    store.store_vector(1, &axis(4, 0), b"").unwrap();
    store.store_vector(2, &axis(4, 1), b"").unwrap();
    store.store_vector(3, &axis(4, 2), b"").unwrap();

    let slot_of_2 = store.allocator.slot_for(2).unwrap();
    store.delete_vector(2).unwrap();
    assert_eq!(store.allocator.free_slot_count(), 1);

    let high_water_before = store.allocator.high_water_mark();
    store.store_vector(4, &axis(4, 3), b"").unwrap();

    assert_eq!(store.allocator.high_water_mark(), high_water_before, "slot was reused, not appended");
    assert_eq!(store.allocator.slot_for(4), Some(slot_of_2));
    assert_eq!(store.retrieve_vector(2).unwrap(), None);
    assert_eq!(store.retrieve_vector(4).unwrap(), Some(axis(4, 3)));
}

#[test]
fn similarity_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");

    let base = axis(768, 0);
    {
        let mut store = open(&path, 768, 10);
        store.store_vector(0, &base, b"").unwrap();
        for i in 1..10 {
            store.store_vector(i, &perturb(&base, i as f32), b"").unwrap();
        }
        for i in 10..15 {
            store.store_vector(i, &perturb(&axis(768, i as usize % 768), i as f32 * 3.0), b"").unwrap();
        }

        let results = store.find_similar_vectors(&base, 5).unwrap();
        assert_eq!(results[0].0, 0);
        assert!(results[0].1 > 0.99);
    }

    let mut reopened = open(&path, 768, 10);
    let results = reopened.find_similar_vectors(&base, 5).unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].0, 0);
    assert!(results[0].1 > 0.99);
}

#[test]
fn multi_cluster_persistence_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");

    {
        let mut store = open(&path, 768, 10);
        let mut id = 0u64;
        for mean in 0..10 {
            let center = axis(768, mean * 70);
            for p in 0..5 {
                store.store_vector(id, &perturb(&center, (mean * 5 + p) as f32), b"").unwrap();
                id += 1;
            }
        }
    }

    let mut reopened = open(&path, 768, 10);
    let results = reopened.find_similar_vectors(&axis(768, 0), 10).unwrap();
    assert!(!results.is_empty());
    for (_, similarity) in &results {
        assert!((-1.0..=1.0).contains(similarity));
    }
}

#[test]
fn corrupt_record_is_isolated_and_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let mut store = open(&path, 8, 2);

    for i in 1..=10u64 {
        store.store_vector(i, &axis(8, i as usize % 8), b"").unwrap();
    }

    let slot = store.allocator.slot_for(5).unwrap();
    let offset = store.slot_region_offset + slot * store.slot_width;
    let mut bytes = store.device.read_at(offset, store.slot_width as usize).unwrap();
    bytes[0] ^= 0xFF;
    store.device.write_at(offset, &bytes).unwrap();

    let err = store.retrieve_vector(5).unwrap_err();
    assert!(matches!(err, Error::CorruptRecord { .. }));

    for i in (1..=10u64).filter(|&i| i != 5) {
        assert!(store.retrieve_vector(i).unwrap().is_some());
    }

    let results = store.find_similar_vectors(&axis(8, 0), 10).unwrap();
    assert!(!results.iter().any(|(id, _)| *id == 5));
}

#[test]
fn dimension_mismatch_leaves_state_unchanged() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let mut store = open(&path, 128, 4);

    let before_live = store.live_count();
    let before_high_water = store.allocator.high_water_mark();
    let before_free = store.allocator.free_slot_count();

    let wrong = vec![0.0f32; 127];
    let err = store.store_vector(1, &wrong, b"").unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 128, actual: 127 }));

    assert_eq!(store.live_count(), before_live);
    assert_eq!(store.allocator.high_water_mark(), before_high_water);
    assert_eq!(store.allocator.free_slot_count(), before_free);
}

#[test]
fn metadata_too_large_does_not_allocate_slot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let config = StoreConfig { max_metadata_len: 4, ..StoreConfig::default() };
    let mut store = Store::initialize(&path, ClusteringStrategy::KMeans, 8, 2, config).unwrap();

    let before_high_water = store.allocator.high_water_mark();
    let err = store.store_vector(1, &axis(8, 0), b"too long").unwrap_err();
    assert!(matches!(err, Error::MetadataTooLarge { .. }));

    assert_eq!(store.allocator.high_water_mark(), before_high_water);
    assert_eq!(store.allocator.free_slot_count(), 0);
    assert_eq!(store.live_count(), 0);
}

#[test]
fn device_busy_on_double_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let _first = open(&path, 8, 2);

    let err = Store::initialize(&path, ClusteringStrategy::KMeans, 8, 2, StoreConfig::default()).unwrap_err();
    assert!(matches!(err, Error::DeviceBusy(_)));
}

#[test]
fn config_validation_rejects_bad_values_before_initialize_touches_the_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");

    let bad = StoreConfig { probe_fraction: 1.5, ..StoreConfig::default() };
    let err = Store::initialize(&path, ClusteringStrategy::KMeans, 8, 2, bad).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(!path.exists());

    let bad = StoreConfig { kmeans_max_iterations: 0, ..StoreConfig::default() };
    let err = Store::initialize(&path, ClusteringStrategy::KMeans, 8, 2, bad).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(!path.exists());
}

#[test]
fn perform_maintenance_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let mut store = open(&path, 16, 3);

    for i in 0..20u64 {
        store.store_vector(i, &perturb(&axis(16, (i % 16) as usize), i as f32), b"").unwrap();
    }

    store.perform_maintenance().unwrap();
    let first = store.cluster_index.to_blob().encode();
    store.perform_maintenance().unwrap();
    let second = store.cluster_index.to_blob().encode();

    assert_eq!(first, second);
}

#[test]
fn find_similar_vectors_scores_are_bounded_and_sorted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let mut store = open(&path, 32, 4);

    for i in 0..40u64 {
        store.store_vector(i, &perturb(&axis(32, (i % 32) as usize), i as f32), b"").unwrap();
    }

    let results = store.find_similar_vectors(&axis(32, 0), 10).unwrap();
    for (_, similarity) in &results {
        assert!((-1.0..=1.0).contains(similarity));
    }
    for pair in results.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
}

#[test]
fn find_similar_vectors_on_empty_store_returns_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let mut store = open(&path, 8, 2);

    assert_eq!(store.find_similar_vectors(&axis(8, 0), 5).unwrap(), Vec::new());
}

#[test]
fn delete_unknown_id_returns_not_found() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let mut store = open(&path, 8, 2);

    let err = store.delete_vector(999).unwrap_err();
    assert!(matches!(err, Error::NotFound(999)));
}

#[test]
fn store_vector_rejects_duplicate_id() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let mut store = open(&path, 8, 2);

    store.store_vector(1, &axis(8, 0), b"").unwrap();
    let err = store.store_vector(1, &axis(8, 1), b"").unwrap_err();
    assert!(matches!(err, Error::DuplicateId(1)));
}

#[test]
fn store_vector_rejects_non_finite_components() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.vcts");
    let mut store = open(&path, 4, 2);

    let mut vector = axis(4, 0);
    vector[1] = f32::NAN;
    let err = store.store_vector(1, &vector, b"").unwrap_err();
    assert!(matches!(err, Error::InvalidVector(_)));
}

#[test]
fn save_and_load_index_round_trips_through_an_external_file() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("store.vcts");
    let index_path = dir.path().join("index.blob");
    let mut store = open(&store_path, 16, 4);

    for i in 0..20u64 {
        store.store_vector(i, &perturb(&axis(16, (i % 16) as usize), i as f32), b"").unwrap();
    }
    store.perform_maintenance().unwrap();
    store.save_index(&index_path).unwrap();

    let saved_blob = store.cluster_index.to_blob();

    store.load_index(&index_path).unwrap();
    assert_eq!(store.cluster_index.to_blob(), saved_blob);
}
