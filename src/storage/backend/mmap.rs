//! Memory-mapped file backend

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};
use parking_lot::RwLock;

use crate::error::{CacheError, Result};

use super::{check_bounds, ByteStore};

/// A live mapping plus the raw base pointer used for disjoint writes
struct Mapping {
    /// Keeps the mapping alive; never remapped
    mmap: MmapMut,
    /// Base of `mmap`, taken once through `&mut`
    base: *mut u8,
    _file: File,
}

/// Block storage in a memory-mapped file
///
/// Reads and writes copy through the mapping's base pointer under a shared
/// guard, so non-overlapping writers proceed in parallel. `close` takes the
/// guard exclusively and unmaps.
pub struct MmapStore {
    mapping: RwLock<Option<Mapping>>,
    capacity: u64,
}

// SAFETY: MmapStore is safe to send/share between threads because:
// 1. the mapping is created once and never moves until it is dropped in close()
// 2. close() needs the exclusive guard, so no copy is in flight while unmapping
// 3. the owning Block never lets a write overlap a concurrent read or write:
//    concurrent slot writers touch distinct slots, and meta scans and free()
//    hold its region lock exclusively (see the backend module docs)
unsafe impl Send for MmapStore {}
unsafe impl Sync for MmapStore {}

impl MmapStore {
    /// Create (or truncate) the file at `path`, size it and map it
    pub fn create(path: &Path, capacity: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(capacity)?;

        // SAFETY: the file is private to this cache directory and is not
        // resized while mapped
        let mut mmap = unsafe { MmapOptions::new().len(capacity as usize).map_mut(&file)? };
        let base = mmap.as_mut_ptr();

        Ok(Self {
            mapping: RwLock::new(Some(Mapping {
                mmap,
                base,
                _file: file,
            })),
            capacity,
        })
    }

    /// Flush dirty pages to the backing file
    pub fn flush(&self) -> Result<()> {
        let guard = self.mapping.read();
        let mapping = guard.as_ref().ok_or(CacheError::Closed)?;
        mapping.mmap.flush()?;
        Ok(())
    }
}

impl ByteStore for MmapStore {
    fn get(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        check_bounds(offset, dst.len(), self.capacity)?;
        let guard = self.mapping.read();
        let mapping = guard.as_ref().ok_or(CacheError::Closed)?;
        // SAFETY: range checked against the mapping length above
        unsafe {
            std::ptr::copy_nonoverlapping(
                mapping.base.add(offset as usize),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        Ok(())
    }

    fn put(&self, offset: u64, src: &[u8]) -> Result<()> {
        check_bounds(offset, src.len(), self.capacity)?;
        let guard = self.mapping.read();
        let mapping = guard.as_ref().ok_or(CacheError::Closed)?;
        // SAFETY: range checked above; the owning Block excludes overlapping access
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                mapping.base.add(offset as usize),
                src.len(),
            );
        }
        Ok(())
    }

    fn free(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(mapping) = self.mapping.write().take() {
            drop(mapping);
        }
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}
