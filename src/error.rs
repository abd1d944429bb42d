//! Error types for the vector cluster store.
//!
//! A single unified error type covers every failure condition the store can
//! surface, each carrying a stable `VSTORE-NNN` code so operators can grep
//! logs for a specific failure class.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while operating the store.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying device I/O failed (VSTORE-001).
    #[error("[VSTORE-001] I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The superblock failed its magic, version, or CRC check (VSTORE-002).
    #[error("[VSTORE-002] Corrupt header: {0}")]
    CorruptHeader(String),

    /// A slot's magic or status byte was invalid on read (VSTORE-003).
    #[error("[VSTORE-003] Corrupt record at slot {slot}: {reason}")]
    CorruptRecord {
        /// Slot index that failed validation.
        slot: u64,
        /// Human-readable reason.
        reason: String,
    },

    /// The cluster index blob failed its envelope or CRC check (VSTORE-004).
    #[error("[VSTORE-004] Corrupt cluster index: {0}")]
    CorruptIndex(String),

    /// A vector's length did not match the store's configured dimension (VSTORE-005).
    #[error("[VSTORE-005] Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Length of the vector that was supplied.
        actual: usize,
    },

    /// A vector contained a non-finite float (VSTORE-006).
    #[error("[VSTORE-006] Invalid vector: {0}")]
    InvalidVector(String),

    /// Attempted to store an ID that is already live (VSTORE-007).
    #[error("[VSTORE-007] Vector ID {0} already exists")]
    DuplicateId(u64),

    /// The requested ID has no live record (VSTORE-008).
    #[error("[VSTORE-008] Vector ID {0} not found")]
    NotFound(u64),

    /// Supplied metadata exceeded the configured maximum length (VSTORE-009).
    #[error("[VSTORE-009] Metadata of {actual} bytes exceeds the {max} byte limit")]
    MetadataTooLarge {
        /// Length of the metadata that was rejected.
        actual: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The backing device is already locked by another instance (VSTORE-010).
    #[error("[VSTORE-010] Device is busy: {0}")]
    DeviceBusy(String),

    /// The backing device has no room left to grow (VSTORE-011).
    #[error("[VSTORE-011] Capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// A configuration value failed validation (VSTORE-012).
    #[error("[VSTORE-012] Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Returns the stable error code (e.g. `"VSTORE-001"`).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "VSTORE-001",
            Self::CorruptHeader(_) => "VSTORE-002",
            Self::CorruptRecord { .. } => "VSTORE-003",
            Self::CorruptIndex(_) => "VSTORE-004",
            Self::DimensionMismatch { .. } => "VSTORE-005",
            Self::InvalidVector(_) => "VSTORE-006",
            Self::DuplicateId(_) => "VSTORE-007",
            Self::NotFound(_) => "VSTORE-008",
            Self::MetadataTooLarge { .. } => "VSTORE-009",
            Self::DeviceBusy(_) => "VSTORE-010",
            Self::CapacityExhausted(_) => "VSTORE-011",
            Self::Config(_) => "VSTORE-012",
        }
    }

    /// Returns true if the failure is isolated to one record or index and the
    /// store can keep serving other operations without reopening.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::CorruptHeader(_) | Self::CapacityExhausted(_))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
