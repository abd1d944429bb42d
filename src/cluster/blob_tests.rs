//! Tests for the `cluster::blob` module.

use super::*;

fn sample() -> ClusterBlob {
    ClusterBlob {
        dimension: 3,
        clusters: vec![
            ClusterInfo {
                centroid: vec![1.0, 0.0, 0.0],
                members: vec![1, 2, 3],
            },
            ClusterInfo {
                centroid: vec![0.0, 1.0, 0.0],
                members: vec![],
            },
            ClusterInfo {
                centroid: vec![0.0, 0.0, 1.0],
                members: vec![4, 5],
            },
        ],
    }
}

#[test]
fn encode_then_decode_round_trips() {
    let blob = sample();
    let encoded = blob.encode();
    let decoded = ClusterBlob::decode(&encoded).unwrap();
    assert_eq!(decoded, blob);
}

#[test]
fn decode_rejects_bad_magic() {
    let mut encoded = sample().encode();
    encoded[0] ^= 0xFF;
    assert!(ClusterBlob::decode(&encoded).is_err());
}

#[test]
fn decode_rejects_bad_crc() {
    let mut encoded = sample().encode();
    let last = encoded.len() - 1;
    encoded[last] ^= 0xFF;
    assert!(ClusterBlob::decode(&encoded).is_err());
}

#[test]
fn decode_rejects_truncated_blob() {
    let encoded = sample().encode();
    let truncated = &encoded[..encoded.len() - 10];
    assert!(ClusterBlob::decode(truncated).is_err());
}

/// Regression test for the nested-container bug: an oversize `info_bytes`
/// on the first cluster must not be allowed to swallow the clusters after
/// it. It must be rejected outright, with the error identifying corruption
/// rather than silently truncating the result to one cluster.
#[test]
fn decode_rejects_cluster_info_whose_declared_size_overruns_the_region() {
    let blob = sample();
    let mut encoded = blob.encode();

    // The cluster entries start right after the 20-byte header.
    let first_info_bytes_offset = 20;
    // Claim a length far larger than the remaining buffer actually holds.
    let bogus_len: u32 = 10_000;
    encoded[first_info_bytes_offset..first_info_bytes_offset + 4]
        .copy_from_slice(&bogus_len.to_le_bytes());

    let err = ClusterBlob::decode(&encoded).unwrap_err();
    assert!(matches!(err, Error::CorruptIndex(_)));
}

/// A cluster whose `member_count` doesn't agree with its own `info_bytes`
/// length prefix must be rejected, not read past its entry boundary into
/// the next cluster's bytes.
#[test]
fn decode_rejects_cluster_info_with_inconsistent_member_count() {
    let blob = ClusterBlob {
        dimension: 2,
        clusters: vec![ClusterInfo {
            centroid: vec![1.0, 0.0],
            members: vec![42],
        }],
    };
    let mut encoded = blob.encode();

    // member_count field sits after info_bytes(4) + centroid(2*4) = offset 12
    // within the cluster entry, which starts at byte 20 in the full blob.
    let member_count_offset = 20 + 4 + 2 * 4;
    encoded[member_count_offset..member_count_offset + 4]
        .copy_from_slice(&99u32.to_le_bytes());

    let err = ClusterBlob::decode(&encoded).unwrap_err();
    assert!(matches!(err, Error::CorruptIndex(_)));
}

#[test]
fn decode_rejects_mismatched_total_bytes_envelope() {
    let mut encoded = sample().encode();
    // total_bytes is the 5th u32 field, at byte offset 16.
    encoded[16..20].copy_from_slice(&1u32.to_le_bytes());
    // Recompute CRC is skipped on purpose: corrupting total_bytes alone,
    // leaving a stale CRC, still must fail (CRC check runs first either way).
    assert!(ClusterBlob::decode(&encoded).is_err());
}

#[test]
fn encode_handles_zero_clusters() {
    let blob = ClusterBlob { dimension: 4, clusters: vec![] };
    let encoded = blob.encode();
    let decoded = ClusterBlob::decode(&encoded).unwrap();
    assert_eq!(decoded, blob);
}
