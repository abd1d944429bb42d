//! Serialization of the cluster index into a single self-describing blob.
//!
//! ```text
//! ClusterBlob  := u32 magic | u32 version | u32 K | u32 D | u32 total_bytes
//!               | ClusterInfo × K | u32 crc32
//! ClusterInfo  := u32 info_bytes | f32 × D (centroid) | u32 member_count
//!               | u64 × member_count (member ids)
//! ```
//!
//! `total_bytes` is the combined length of the `K` `ClusterInfo` entries and
//! is validated against the blob's actual length before any entry is parsed.
//! Each `ClusterInfo` carries its own `info_bytes` length prefix and the
//! reader advances by exactly that many bytes after decoding it — never by
//! trusting `member_count` to mean "the rest of the buffer", which is what
//! let one oversize entry consume every byte meant for the clusters after
//! it.

use crate::error::{Error, Result};
use crate::layout::{CLUSTER_BLOB_MAGIC, FORMAT_VERSION};
use crate::util::crc32;

/// One cluster's centroid and current membership.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterInfo {
    /// The cluster's centroid, un-normalized, `dimension` components long.
    pub centroid: Vec<f32>,
    /// IDs of the vectors currently assigned to this cluster.
    pub members: Vec<u64>,
}

/// The full set of clusters, ready to serialize or just deserialized.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterBlob {
    /// Vector dimension; every centroid has this many components.
    pub dimension: usize,
    /// The clusters, in a stable order.
    pub clusters: Vec<ClusterInfo>,
}

fn encode_cluster_info(info: &ClusterInfo) -> Vec<u8> {
    let member_count = u32::try_from(info.members.len()).expect("member count fits in u32");
    let info_bytes = 4 + info.centroid.len() * 4 + 4 + info.members.len() * 8;
    let info_bytes_u32 = u32::try_from(info_bytes).expect("cluster info fits in u32");

    let mut buf = Vec::with_capacity(info_bytes);
    buf.extend_from_slice(&info_bytes_u32.to_le_bytes());
    for c in &info.centroid {
        buf.extend_from_slice(&c.to_le_bytes());
    }
    buf.extend_from_slice(&member_count.to_le_bytes());
    for &id in &info.members {
        buf.extend_from_slice(&id.to_le_bytes());
    }
    buf
}

/// Decodes exactly one `ClusterInfo` starting at `buf[0]`, returning it
/// along with the number of bytes consumed (`info_bytes`, the entry's own
/// length prefix — never inferred from `member_count`).
fn decode_cluster_info(buf: &[u8], dimension: usize) -> Result<(ClusterInfo, usize)> {
    if buf.len() < 4 {
        return Err(Error::CorruptIndex("cluster info truncated before its length prefix".into()));
    }
    let info_bytes = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;

    let min_bytes = 4 + dimension * 4 + 4;
    if info_bytes < min_bytes || info_bytes > buf.len() {
        return Err(Error::CorruptIndex(format!(
            "cluster info declares {info_bytes} bytes, which does not fit in the {} bytes available",
            buf.len()
        )));
    }

    let entry = &buf[..info_bytes];
    let mut cursor = 4;

    let mut centroid = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let v = f32::from_le_bytes(entry[cursor..cursor + 4].try_into().unwrap());
        centroid.push(v);
        cursor += 4;
    }

    let member_count = u32::from_le_bytes(entry[cursor..cursor + 4].try_into().unwrap()) as usize;
    cursor += 4;

    let expected_len = cursor + member_count * 8;
    if expected_len != info_bytes {
        return Err(Error::CorruptIndex(format!(
            "cluster info declares {member_count} members but its length prefix ({info_bytes}) doesn't match"
        )));
    }

    let mut members = Vec::with_capacity(member_count);
    for _ in 0..member_count {
        let id = u64::from_le_bytes(entry[cursor..cursor + 8].try_into().unwrap());
        members.push(id);
        cursor += 8;
    }

    Ok((ClusterInfo { centroid, members }, info_bytes))
}

impl ClusterBlob {
    /// Serializes this cluster set into a self-describing, CRC-checked blob.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let k = u32::try_from(self.clusters.len()).expect("cluster count fits in u32");
        let d = u32::try_from(self.dimension).expect("dimension fits in u32");

        let entries: Vec<u8> = self
            .clusters
            .iter()
            .flat_map(|c| encode_cluster_info(c))
            .collect();
        let total_bytes = u32::try_from(entries.len()).expect("cluster region fits in u32");

        let mut buf = Vec::with_capacity(20 + entries.len() + 4);
        buf.extend_from_slice(&CLUSTER_BLOB_MAGIC.to_be_bytes());
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&k.to_le_bytes());
        buf.extend_from_slice(&d.to_le_bytes());
        buf.extend_from_slice(&total_bytes.to_le_bytes());
        buf.extend_from_slice(&entries);

        let crc = crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Deserializes a blob previously written by [`ClusterBlob::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptIndex`] if the magic, version, declared
    /// `total_bytes` envelope, any individual `ClusterInfo`'s length prefix,
    /// or the trailing CRC fail validation. `total_bytes` is checked against
    /// the blob's actual length before a single `ClusterInfo` is parsed.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        const HEADER: usize = 20;
        if buf.len() < HEADER + 4 {
            return Err(Error::CorruptIndex("cluster blob shorter than its header".into()));
        }

        let magic = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        if magic != CLUSTER_BLOB_MAGIC {
            return Err(Error::CorruptIndex(format!("bad cluster blob magic 0x{magic:08x}")));
        }

        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(Error::CorruptIndex(format!("unsupported cluster blob version {version}")));
        }

        let k = u32::from_le_bytes(buf[8..12].try_into().unwrap()) as usize;
        let d = u32::from_le_bytes(buf[12..16].try_into().unwrap()) as usize;
        let total_bytes = u32::from_le_bytes(buf[16..20].try_into().unwrap()) as usize;

        let (body, crc_bytes) = buf.split_at(buf.len() - 4);
        let stored_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        if crc32(body) != stored_crc {
            return Err(Error::CorruptIndex("cluster blob CRC mismatch".into()));
        }

        let entries_region = &body[HEADER..];
        if total_bytes != entries_region.len() {
            return Err(Error::CorruptIndex(format!(
                "cluster blob declares {total_bytes} bytes of cluster entries but {} are present",
                entries_region.len()
            )));
        }

        let mut clusters = Vec::with_capacity(k);
        let mut offset = 0usize;
        for _ in 0..k {
            if offset >= entries_region.len() {
                return Err(Error::CorruptIndex("cluster blob ended before all clusters were read".into()));
            }
            let (info, consumed) = decode_cluster_info(&entries_region[offset..], d)?;
            clusters.push(info);
            offset += consumed;
        }

        if offset != entries_region.len() {
            return Err(Error::CorruptIndex("cluster blob has trailing bytes after the last cluster".into()));
        }

        Ok(Self { dimension: d, clusters })
    }
}

#[cfg(test)]
#[path = "blob_tests.rs"]
mod tests;
