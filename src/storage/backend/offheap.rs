//! Off-heap backend
//!
//! One zeroed allocation per block, owned outside any cache structure and
//! addressed only through byte offsets.

use parking_lot::RwLock;

use crate::error::{CacheError, Result};

use super::{check_bounds, ByteStore};

struct Region {
    /// Owns the allocation; never reallocated
    _buf: Vec<u8>,
    base: *mut u8,
}

/// Block storage in an explicitly allocated memory region
pub struct OffHeapStore {
    region: RwLock<Option<Region>>,
    capacity: u64,
}

// SAFETY: same discipline as MmapStore: the allocation never moves, close()
// holds the exclusive guard, and the owning Block's region lock keeps every
// write from overlapping a concurrent read or write.
unsafe impl Send for OffHeapStore {}
unsafe impl Sync for OffHeapStore {}

impl OffHeapStore {
    /// Allocate a zeroed region of `capacity` bytes
    pub fn new(capacity: u64) -> Result<Self> {
        let len = usize::try_from(capacity).map_err(|_| {
            CacheError::BadArgument(format!("off-heap capacity {} exceeds address space", capacity))
        })?;
        let mut buf = vec![0u8; len];
        let base = buf.as_mut_ptr();

        Ok(Self {
            region: RwLock::new(Some(Region { _buf: buf, base })),
            capacity,
        })
    }
}

impl ByteStore for OffHeapStore {
    fn get(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        check_bounds(offset, dst.len(), self.capacity)?;
        let guard = self.region.read();
        let region = guard.as_ref().ok_or(CacheError::Closed)?;
        // SAFETY: range checked against the allocation length above
        unsafe {
            std::ptr::copy_nonoverlapping(
                region.base.add(offset as usize),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        Ok(())
    }

    fn put(&self, offset: u64, src: &[u8]) -> Result<()> {
        check_bounds(offset, src.len(), self.capacity)?;
        let guard = self.region.read();
        let region = guard.as_ref().ok_or(CacheError::Closed)?;
        // SAFETY: range checked above; the owning Block excludes overlapping access
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                region.base.add(offset as usize),
                src.len(),
            );
        }
        Ok(())
    }

    fn free(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(region) = self.region.write().take() {
            drop(region);
        }
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}
