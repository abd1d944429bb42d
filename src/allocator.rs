//! Slot allocator: maps vector IDs to slot indices and tracks free slots.
//!
//! The allocator's state is persisted in the allocator footer region (see
//! [`crate::layout`]) and rewritten whenever the high-water mark grows or the
//! store is flushed. If the footer cannot be read back, [`rebuild_by_scan`]
//! reconstructs the same state by reading every slot.

use rustc_hash::FxHashMap;

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::layout::ALLOC_FOOTER_MAGIC;
use crate::record;
use crate::util::crc32;

/// In-memory slot allocator state.
#[derive(Debug, Default)]
pub struct SlotAllocator {
    mapping: FxHashMap<u64, u64>,
    /// Indices of slots available for reuse, most recently freed last.
    free_list: Vec<u64>,
    /// One past the highest slot index ever handed out.
    high_water_mark: u64,
}

impl SlotAllocator {
    /// Builds an empty allocator for a freshly initialized store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots ever allocated, including tombstoned ones.
    #[must_use]
    pub const fn high_water_mark(&self) -> u64 {
        self.high_water_mark
    }

    /// The slot index holding `id`'s record, if it is currently live.
    #[must_use]
    pub fn slot_for(&self, id: u64) -> Option<u64> {
        self.mapping.get(&id).copied()
    }

    /// Number of live (mapped) vectors.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.mapping.len()
    }

    /// Number of slots currently on the free list, available for reuse
    /// before the allocator grows the backing store.
    #[must_use]
    pub fn free_slot_count(&self) -> usize {
        self.free_list.len()
    }

    /// All live vector IDs.
    pub fn live_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.mapping.keys().copied()
    }

    /// Reserves a slot for a new `id`, reusing a freed slot before growing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateId`] if `id` is already live.
    pub fn allocate(&mut self, id: u64) -> Result<u64> {
        if self.mapping.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }

        let slot = if let Some(reused) = self.free_list.pop() {
            reused
        } else {
            let new_slot = self.high_water_mark;
            self.high_water_mark += 1;
            new_slot
        };

        self.mapping.insert(id, slot);
        Ok(slot)
    }

    /// Releases `id`'s slot back to the free list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `id` has no live slot.
    pub fn free(&mut self, id: u64) -> Result<u64> {
        let slot = self.mapping.remove(&id).ok_or(Error::NotFound(id))?;
        self.free_list.push(slot);
        Ok(slot)
    }

    /// Serializes the allocator footer: magic, high-water mark, free list,
    /// ID-to-slot mapping, and a trailing CRC-32 over everything before it.
    #[must_use]
    pub fn encode_footer(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&ALLOC_FOOTER_MAGIC.to_be_bytes());
        buf.extend_from_slice(&self.high_water_mark.to_le_bytes());

        let free_count = u32::try_from(self.free_list.len()).expect("free list fits in u32");
        buf.extend_from_slice(&free_count.to_le_bytes());
        for &slot in &self.free_list {
            buf.extend_from_slice(&slot.to_le_bytes());
        }

        let mapping_count = u32::try_from(self.mapping.len()).expect("mapping fits in u32");
        buf.extend_from_slice(&mapping_count.to_le_bytes());
        for (&id, &slot) in &self.mapping {
            buf.extend_from_slice(&id.to_le_bytes());
            buf.extend_from_slice(&slot.to_le_bytes());
        }

        let crc = crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Deserializes an allocator footer previously written by
    /// [`SlotAllocator::encode_footer`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptIndex`] if the magic, declared counts, or CRC
    /// do not check out. Declared counts are validated against the buffer
    /// length before they are used to size any read loop.
    pub fn decode_footer(buf: &[u8]) -> Result<Self> {
        const HEADER: usize = 4 + 8 + 4;
        if buf.len() < HEADER + 4 {
            return Err(Error::CorruptIndex("allocator footer shorter than its header".into()));
        }

        let magic = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        if magic != ALLOC_FOOTER_MAGIC {
            return Err(Error::CorruptIndex(format!("bad allocator footer magic 0x{magic:08x}")));
        }

        if buf.len() < 4 {
            return Err(Error::CorruptIndex("allocator footer missing trailing CRC".into()));
        }
        let (body, crc_bytes) = buf.split_at(buf.len() - 4);
        let stored_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        let computed_crc = crc32(body);
        if stored_crc != computed_crc {
            return Err(Error::CorruptIndex("allocator footer CRC mismatch".into()));
        }

        let high_water_mark = u64::from_le_bytes(buf[4..12].try_into().unwrap());

        let mut cursor = HEADER;
        let free_count = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap()) as u64;
        cursor += 4;

        let max_possible_free = (body.len().saturating_sub(cursor)) as u64 / 8;
        if free_count > max_possible_free {
            return Err(Error::CorruptIndex(format!(
                "free list claims {free_count} entries but only room for {max_possible_free}"
            )));
        }

        let mut free_list = Vec::with_capacity(free_count as usize);
        for _ in 0..free_count {
            let slot = u64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
            free_list.push(slot);
            cursor += 8;
        }

        if cursor + 4 > body.len() {
            return Err(Error::CorruptIndex("allocator footer truncated before mapping count".into()));
        }
        let mapping_count = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap()) as u64;
        cursor += 4;

        let max_possible_mappings = (body.len().saturating_sub(cursor)) as u64 / 16;
        if mapping_count > max_possible_mappings {
            return Err(Error::CorruptIndex(format!(
                "mapping claims {mapping_count} entries but only room for {max_possible_mappings}"
            )));
        }

        let mut mapping = FxHashMap::default();
        mapping.reserve(mapping_count as usize);
        for _ in 0..mapping_count {
            let id = u64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
            cursor += 8;
            let slot = u64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
            cursor += 8;
            mapping.insert(id, slot);
        }

        Ok(Self {
            mapping,
            free_list,
            high_water_mark,
        })
    }
}

/// Rebuilds allocator state by reading every slot in `0..slot_count`,
/// used when the allocator footer is missing or fails to decode.
///
/// # Errors
///
/// Returns an error if a slot cannot be read from the device. A slot whose
/// magic or status byte is unreadable is treated as free rather than
/// aborting the scan, so one damaged slot does not block recovery of the
/// rest of the store.
pub fn rebuild_by_scan(
    device: &mut BlockDevice,
    slot_region_offset: u64,
    slot_width: u64,
    slot_count: u64,
    dimension: usize,
) -> Result<SlotAllocator> {
    let mut allocator = SlotAllocator::new();
    allocator.high_water_mark = slot_count;

    for slot in 0..slot_count {
        let offset = slot_region_offset + slot * slot_width;
        let buf = device.read_at(offset, slot_width as usize)?;

        if record::is_live(&buf) {
            match record::decode(&buf, dimension, slot) {
                Ok(decoded) => {
                    allocator.mapping.insert(decoded.id, slot);
                    continue;
                }
                Err(_) => {
                    // Corrupt despite a LIVE status byte: treat as unusable,
                    // not reusable, so it is neither double-assigned nor silently dropped.
                    continue;
                }
            }
        }

        allocator.free_list.push(slot);
    }

    Ok(allocator)
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;
