//! File backend
//!
//! Positional reads and writes on a regular file sized to the block
//! capacity. No shared seek position, so readers and writers never
//! serialize on the file handle.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{CacheError, Result};

use super::{check_bounds, ByteStore};

/// Block storage in a plain file
pub struct FileStore {
    /// Backing file path
    path: PathBuf,
    /// `None` once closed
    file: RwLock<Option<File>>,
    /// Region size in bytes
    capacity: u64,
}

impl FileStore {
    /// Create (or truncate) the file at `path` and size it to `capacity`
    pub fn create(path: &Path, capacity: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(capacity)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(Some(file)),
            capacity,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteStore for FileStore {
    fn get(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        check_bounds(offset, dst.len(), self.capacity)?;
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(CacheError::Closed)?;
        read_exact_at(file, dst, offset)?;
        Ok(())
    }

    fn put(&self, offset: u64, src: &[u8]) -> Result<()> {
        check_bounds(offset, src.len(), self.capacity)?;
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(CacheError::Closed)?;
        write_all_at(file, src, offset)?;
        Ok(())
    }

    fn free(&self) -> Result<()> {
        // Content is erased logically; the block rewrites its head on reuse
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(file) = self.file.write().take() {
            drop(file);
        }
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset)? {
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            n => {
                buf = &buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}
