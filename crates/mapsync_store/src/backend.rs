//! Byte-level backends for the mutation log.
//!
//! Backends are opaque append-only byte stores. Framing, checksums and
//! replay live in [`crate::log`].

use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// An append-only byte store holding the mutation log.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - after `sync` returns, all appended data survives process termination
pub trait LogBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>>;

    /// Appends data, returning the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StoreResult<u64>;

    /// Makes all appended data durable.
    fn sync(&mut self) -> StoreResult<()>;

    /// Current size in bytes.
    fn size(&self) -> StoreResult<u64>;

    /// Drops everything after `new_size`. Used to cut off a torn tail.
    fn truncate(&mut self, new_size: u64) -> StoreResult<()>;
}

fn check_range(offset: u64, len: usize, size: u64) -> StoreResult<()> {
    let end = offset.saturating_add(len as u64);
    if offset > size || end > size {
        return Err(StoreError::ReadPastEnd { offset, len, size });
    }
    Ok(())
}

fn check_truncate(new_size: u64, size: u64) -> StoreResult<()> {
    if new_size > size {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cannot truncate log to {new_size} bytes, current size is {size}"),
        )));
    }
    Ok(())
}

/// In-memory log backend for tests and ephemeral stores.
#[derive(Debug, Default)]
pub struct MemoryLog {
    data: RwLock<Vec<u8>>,
}

impl MemoryLog {
    /// Creates an empty in-memory log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory log with pre-existing bytes.
    ///
    /// Useful for replaying damaged logs in tests.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of the log bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl LogBackend for MemoryLog {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        let data = self.data.read();
        check_range(offset, len, data.len() as u64)?;
        let start = offset as usize;
        Ok(data[start..start + len].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StoreResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn sync(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StoreResult<()> {
        let mut data = self.data.write();
        check_truncate(new_size, data.len() as u64)?;
        data.truncate(new_size as usize);
        Ok(())
    }
}

/// File-backed log.
///
/// `sync` calls `File::sync_data`, so a returned write is on disk.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    file: RwLock<File>,
    size: u64,
}

impl FileLog {
    /// Opens or creates the log file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size,
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogBackend for FileLog {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StoreResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        let mut file = self.file.write();
        let written = file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(data));
        cut_back_on_error(&file, offset, written)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn sync(&mut self) -> StoreResult<()> {
        let mut file = self.file.write();
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.size)
    }

    fn truncate(&mut self, new_size: u64) -> StoreResult<()> {
        check_truncate(new_size, self.size)?;
        let file = self.file.write();
        file.set_len(new_size)?;
        file.sync_all()?;
        self.size = new_size;
        Ok(())
    }
}

/// Drops whatever a failed write left past `size`, then reports the failure.
fn cut_back_on_error(file: &File, size: u64, written: io::Result<()>) -> StoreResult<()> {
    if let Err(e) = written {
        if let Err(cut) = file.set_len(size) {
            warn!(error = %cut, size, "could not drop partially written log tail");
        }
        return Err(e.into());
    }
    Ok(())
}
