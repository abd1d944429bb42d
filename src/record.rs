//! Vector record codec: encoding and decoding of a single fixed-width slot.
//!
//! Layout (see [`crate::layout`] for the byte offsets):
//! `magic(4) | id(8) | status(1) | reserved(3) | vector(4*D) | meta_len(4) | meta(meta_len) | pad`

use crate::error::{Error, Result};
use crate::layout::{
    METADATA_LEN_PREFIX_SIZE, SLOT_HEADER_SIZE, SLOT_MAGIC, SLOT_STATUS_FREE, SLOT_STATUS_LIVE,
    SLOT_STATUS_TOMBSTONE,
};

/// Byte offset of the status field within a slot.
pub const STATUS_OFFSET: u64 = 12;

/// A vector record decoded from a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Identifier of the stored vector.
    pub id: u64,
    /// The vector's components.
    pub vector: Vec<f32>,
    /// Opaque metadata bytes supplied by the caller.
    pub metadata: Vec<u8>,
}

/// Validates that every component of `vector` is finite.
///
/// # Errors
///
/// Returns [`Error::InvalidVector`] naming the first non-finite index found.
pub fn validate_finite(vector: &[f32]) -> Result<()> {
    for (i, x) in vector.iter().enumerate() {
        if !x.is_finite() {
            return Err(Error::InvalidVector(format!(
                "component {i} is not finite: {x}"
            )));
        }
    }
    Ok(())
}

/// Encodes a live record into a buffer of exactly `slot_width` bytes.
///
/// # Errors
///
/// Returns [`Error::MetadataTooLarge`] if `metadata.len()` would not fit in
/// the slot alongside the header and vector.
pub fn encode(id: u64, vector: &[f32], metadata: &[u8], slot_width: u64) -> Result<Vec<u8>> {
    let vector_bytes = vector.len() as u64 * 4;
    let fixed = SLOT_HEADER_SIZE + vector_bytes + METADATA_LEN_PREFIX_SIZE;
    let max_metadata = slot_width.saturating_sub(fixed);
    if metadata.len() as u64 > max_metadata {
        return Err(Error::MetadataTooLarge {
            actual: metadata.len(),
            max: max_metadata as usize,
        });
    }

    let mut buf = vec![0u8; slot_width as usize];
    buf[0..4].copy_from_slice(&SLOT_MAGIC.to_be_bytes());
    buf[4..12].copy_from_slice(&id.to_le_bytes());
    buf[12] = SLOT_STATUS_LIVE;
    // bytes 13..16 stay zero (reserved)

    let mut cursor = SLOT_HEADER_SIZE as usize;
    for component in vector {
        buf[cursor..cursor + 4].copy_from_slice(&component.to_le_bytes());
        cursor += 4;
    }

    let meta_len = u32::try_from(metadata.len()).expect("metadata length bounded by slot_width");
    buf[cursor..cursor + 4].copy_from_slice(&meta_len.to_le_bytes());
    cursor += 4;
    buf[cursor..cursor + metadata.len()].copy_from_slice(metadata);

    Ok(buf)
}

/// Decodes a live record from a slot-width buffer.
///
/// `slot` identifies the slot for error reporting only.
///
/// # Errors
///
/// Returns [`Error::CorruptRecord`] if the magic is wrong, the status byte
/// is not [`SLOT_STATUS_LIVE`], or the metadata length prefix claims more
/// bytes than the slot can hold.
pub fn decode(buf: &[u8], dimension: usize, slot: u64) -> Result<VectorRecord> {
    if buf.len() < SLOT_HEADER_SIZE as usize {
        return Err(Error::CorruptRecord {
            slot,
            reason: "slot shorter than the fixed header".to_string(),
        });
    }

    let magic = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    if magic != SLOT_MAGIC {
        return Err(Error::CorruptRecord {
            slot,
            reason: format!("bad magic 0x{magic:08x}"),
        });
    }

    let status = buf[12];
    if status != SLOT_STATUS_LIVE {
        return Err(Error::CorruptRecord {
            slot,
            reason: format!("status byte {status} is not LIVE"),
        });
    }

    let id = u64::from_le_bytes(buf[4..12].try_into().unwrap());

    let vector_bytes = dimension * 4;
    let mut cursor = SLOT_HEADER_SIZE as usize;
    let vector_end = cursor + vector_bytes;
    if buf.len() < vector_end + METADATA_LEN_PREFIX_SIZE as usize {
        return Err(Error::CorruptRecord {
            slot,
            reason: "slot too short for its configured dimension".to_string(),
        });
    }

    let mut vector = Vec::with_capacity(dimension);
    while cursor < vector_end {
        let component = f32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        vector.push(component);
        cursor += 4;
    }

    let meta_len =
        u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap()) as usize;
    cursor += METADATA_LEN_PREFIX_SIZE as usize;

    if cursor + meta_len > buf.len() {
        return Err(Error::CorruptRecord {
            slot,
            reason: format!("metadata length {meta_len} exceeds remaining slot bytes"),
        });
    }

    let metadata = buf[cursor..cursor + meta_len].to_vec();

    Ok(VectorRecord { id, vector, metadata })
}

/// Returns true if the slot's status byte, at the fixed [`STATUS_OFFSET`],
/// is [`SLOT_STATUS_LIVE`].
#[must_use]
pub fn is_live(buf: &[u8]) -> bool {
    buf.len() > STATUS_OFFSET as usize && buf[STATUS_OFFSET as usize] == SLOT_STATUS_LIVE
}

/// Returns the status byte, or [`SLOT_STATUS_FREE`] if the buffer is too
/// short to contain one.
#[must_use]
pub fn status(buf: &[u8]) -> u8 {
    buf.get(STATUS_OFFSET as usize).copied().unwrap_or(SLOT_STATUS_FREE)
}

/// Marks a slot tombstoned by overwriting only its status byte; the rest of
/// the slot (vector, metadata) is left in place for diagnostic recovery.
pub fn tombstone(buf: &mut [u8]) {
    if buf.len() > STATUS_OFFSET as usize {
        buf[STATUS_OFFSET as usize] = SLOT_STATUS_TOMBSTONE;
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
