//! On-device binary layout constants.
//!
//! Every multi-byte integer in the on-device format is little-endian, with
//! one deliberate exception: the four magic tags below are written and
//! compared as big-endian bytes, so the bytes on disk spell their ASCII tag
//! (`VCTS`, `VREC`, ...) in order rather than reversed. This matches how the
//! tags are defined here as numeric constants. Every region (superblock,
//! allocator footer, cluster blob) ends in a CRC-32 ([`crate::util::crc32`])
//! computed over the bytes that precede it.

/// Superblock magic, spells `"VCTS"` when read as big-endian bytes.
pub const SUPERBLOCK_MAGIC: u32 = 0x5643_5453;
/// Slot magic, spells `"VREC"` when read as big-endian bytes.
pub const SLOT_MAGIC: u32 = 0x5652_4543;
/// Allocator footer magic, spells `"VALO"` when read as big-endian bytes.
pub const ALLOC_FOOTER_MAGIC: u32 = 0x5641_4C4F;
/// Cluster blob magic, spells `"VCLS"` when read as big-endian bytes.
pub const CLUSTER_BLOB_MAGIC: u32 = 0x5643_4C53;

/// On-disk format version written by this implementation.
pub const FORMAT_VERSION: u32 = 1;

/// Fixed size, in bytes, of the superblock region at offset 0.
pub const SUPERBLOCK_SIZE: u64 = 4096;

/// Slot widths are always a multiple of this value.
pub const SLOT_ALIGNMENT: u64 = 512;

/// Fixed header portion of a slot: magic (4) + id (8) + status (1) + reserved (3).
pub const SLOT_HEADER_SIZE: u64 = 16;

/// Size of the metadata length prefix within a slot.
pub const METADATA_LEN_PREFIX_SIZE: u64 = 4;

/// Status byte meaning the slot holds no live record.
pub const SLOT_STATUS_FREE: u8 = 0;
/// Status byte meaning the slot holds a live, readable record.
pub const SLOT_STATUS_LIVE: u8 = 1;
/// Status byte meaning the slot held a record that has been deleted.
pub const SLOT_STATUS_TOMBSTONE: u8 = 2;

/// Computes the slot width required to hold `dimension` f32 components and
/// up to `max_metadata_len` bytes of opaque metadata, rounded up to
/// [`SLOT_ALIGNMENT`].
#[must_use]
pub fn slot_width(dimension: usize, max_metadata_len: usize) -> u64 {
    let vector_bytes = (dimension as u64) * 4;
    let unaligned = SLOT_HEADER_SIZE + vector_bytes + METADATA_LEN_PREFIX_SIZE + max_metadata_len as u64;
    unaligned.div_ceil(SLOT_ALIGNMENT) * SLOT_ALIGNMENT
}
