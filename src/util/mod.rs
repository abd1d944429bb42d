//! Small helpers shared by the storage layers.
//!
//! - Safe type conversion macros (`checked_u32`)
//! - CRC-32 checksum used by every on-device region

pub mod checksum;
pub mod convert;

pub use checksum::crc32;
pub use convert::checked_u32;

#[cfg(test)]
#[path = "../util_tests.rs"]
mod tests;
