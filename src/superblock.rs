//! The fixed 4 KiB superblock at offset 0: magic, format version, the
//! store's dimension and cluster count, and the offset/length of every
//! other region. Every other region is reachable only by reading this one
//! first, so its own corruption is fatal rather than isolated (see
//! [`crate::error::Error::CorruptHeader`]).

use crate::error::{Error, Result};
use crate::layout::{FORMAT_VERSION, SUPERBLOCK_MAGIC, SUPERBLOCK_SIZE};
use crate::util::crc32;

/// Byte offset, within the superblock, where the trailing CRC-32 lives.
const CRC_OFFSET: usize = SUPERBLOCK_SIZE as usize - 4;

/// The superblock: anchors every other on-device region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    /// Vector dimension every record in this store holds.
    pub dimension: u32,
    /// Number of clusters in the coarse index.
    pub cluster_count: u32,
    /// Width, in bytes, of one slot. Always a multiple of 512.
    pub slot_width: u64,
    /// Byte offset of the first slot, always [`SUPERBLOCK_SIZE`].
    pub slot_region_offset: u64,
    /// Total byte length of the slot region (`slot_width * slot_count`).
    pub slot_region_length: u64,
    /// Byte offset of the allocator footer.
    pub alloc_footer_offset: u64,
    /// Byte offset of the cluster index region.
    pub cluster_region_offset: u64,
    /// Byte length reserved for the cluster index region.
    pub cluster_region_length: u64,
    /// Count of currently-live vectors, maintained as a cheap diagnostic;
    /// not authoritative (the allocator's mapping is authoritative).
    pub live_vector_count: u64,
}

impl Superblock {
    /// Encodes the superblock into exactly [`SUPERBLOCK_SIZE`] bytes,
    /// zero-padding the reserved region and trailing the CRC.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; SUPERBLOCK_SIZE as usize];
        buf[0..4].copy_from_slice(&SUPERBLOCK_MAGIC.to_be_bytes());
        buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&self.dimension.to_le_bytes());
        buf[12..16].copy_from_slice(&self.cluster_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.slot_width.to_le_bytes());
        buf[24..32].copy_from_slice(&self.slot_region_offset.to_le_bytes());
        buf[32..40].copy_from_slice(&self.slot_region_length.to_le_bytes());
        buf[40..48].copy_from_slice(&self.alloc_footer_offset.to_le_bytes());
        buf[48..56].copy_from_slice(&self.cluster_region_offset.to_le_bytes());
        buf[56..64].copy_from_slice(&self.cluster_region_length.to_le_bytes());
        buf[64..72].copy_from_slice(&self.live_vector_count.to_le_bytes());
        // bytes 72..CRC_OFFSET stay zero (reserved)

        let crc = crc32(&buf[0..CRC_OFFSET]);
        buf[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes a superblock previously written by [`Superblock::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptHeader`] if the buffer is short, the magic is
    /// wrong, the version is unsupported, or the trailing CRC does not match
    /// the bytes that precede it.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < SUPERBLOCK_SIZE as usize {
            return Err(Error::CorruptHeader(format!(
                "superblock buffer is {} bytes, expected {SUPERBLOCK_SIZE}",
                buf.len()
            )));
        }

        let magic = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        if magic != SUPERBLOCK_MAGIC {
            return Err(Error::CorruptHeader(format!("bad superblock magic 0x{magic:08x}")));
        }

        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(Error::CorruptHeader(format!("unsupported format version {version}")));
        }

        let stored_crc = u32::from_le_bytes(buf[CRC_OFFSET..CRC_OFFSET + 4].try_into().unwrap());
        let computed_crc = crc32(&buf[0..CRC_OFFSET]);
        if stored_crc != computed_crc {
            return Err(Error::CorruptHeader("superblock CRC mismatch".to_string()));
        }

        Ok(Self {
            dimension: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            cluster_count: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            slot_width: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            slot_region_offset: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            slot_region_length: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            alloc_footer_offset: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
            cluster_region_offset: u64::from_le_bytes(buf[48..56].try_into().unwrap()),
            cluster_region_length: u64::from_le_bytes(buf[56..64].try_into().unwrap()),
            live_vector_count: u64::from_le_bytes(buf[64..72].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
#[path = "superblock_tests.rs"]
mod tests;
