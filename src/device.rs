//! Block device abstraction.
//!
//! Opens a path — a regular file or a block/character special file — as a
//! random-access byte store addressed by logical offset. A regular file
//! grows via `set_len`; a block special file is fixed-size and `ensure_size`
//! fails rather than attempting to resize it.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};

#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;

/// A random-access byte store backing the vector cluster store.
pub struct BlockDevice {
    file: File,
    capacity: u64,
    is_block_special: bool,
}

impl BlockDevice {
    /// Opens `path`, creating a regular file if it does not exist. Block and
    /// character special files are opened as-is and never created.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened, or if an advisory
    /// exclusive lock on it is already held by another instance.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        lock_exclusive(&file).map_err(|_| {
            Error::DeviceBusy(format!("{} is already locked by another instance", path.display()))
        })?;

        let metadata = file.metadata()?;
        let is_block_special = is_block_special(&metadata);
        let capacity = if is_block_special {
            let mut f = file.try_clone()?;
            f.seek(SeekFrom::End(0))?
        } else {
            metadata.len()
        };

        Ok(Self {
            file,
            capacity,
            is_block_special,
        })
    }

    /// Current capacity, in bytes, of the backing store.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Reads exactly `len` bytes starting at `offset`. A short read is an
    /// error rather than a partial result.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails or the device has fewer
    /// than `offset + len` bytes.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Writes `bytes` at `offset`, growing the device first if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the write would exceed a fixed-size block device's
    /// capacity, or if the underlying I/O fails.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let end = offset + bytes.len() as u64;
        if end > self.capacity {
            self.ensure_size(end)?;
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Flushes buffered writes and asks the OS to persist them to the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying sync fails.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Grows the backing store so that `new_capacity` bytes are addressable.
    /// A no-op if the device is already at least that large.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExhausted`] if the backing store is a fixed-
    /// size block device smaller than `new_capacity`.
    pub fn ensure_size(&mut self, new_capacity: u64) -> Result<()> {
        if new_capacity <= self.capacity {
            return Ok(());
        }
        if self.is_block_special {
            return Err(Error::CapacityExhausted(format!(
                "block device has {} bytes, {} requested",
                self.capacity, new_capacity
            )));
        }
        self.file.set_len(new_capacity)?;
        self.capacity = new_capacity;
        Ok(())
    }
}

#[cfg(unix)]
fn is_block_special(metadata: &std::fs::Metadata) -> bool {
    let file_type = metadata.file_type();
    file_type.is_block_device() || file_type.is_char_device()
}

#[cfg(not(unix))]
fn is_block_special(_metadata: &std::fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    // SAFETY: fd is a valid, open file descriptor for the lifetime of this call.
    let rc = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
