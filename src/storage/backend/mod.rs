//! Byte backends for blocks
//!
//! Every block owns one [`ByteStore`]: a fixed-capacity byte region with
//! blocking positional I/O. The three implementations are interchangeable
//! and selected per block by [`StorageMode`](crate::config::StorageMode).
//!
//! Backends do not order overlapping accesses themselves; the owning block
//! does. Payload ranges are written once per generation by the store that
//! reserved them. A Meta slot is written only by its store, by a tombstone
//! under the key's stripe writer lock, or by an access-time refresh under
//! the stripe reader lock plus the pointer mutex, and every slot write
//! holds the block's region lock shared. Reads spanning other records'
//! slots (meta scans) hold it exclusively, as does `free`.

mod file;
mod mmap;
mod offheap;

use std::path::Path;

use crate::config::StorageMode;
use crate::error::{CacheError, Result};

pub use file::FileStore;
pub use mmap::MmapStore;
pub use offheap::OffHeapStore;

/// Random-access byte I/O over a fixed-capacity region
pub trait ByteStore: Send + Sync {
    /// Fill `dst` with the bytes at `offset`
    fn get(&self, offset: u64, dst: &mut [u8]) -> Result<()>;

    /// Write `src` at `offset`
    fn put(&self, offset: u64, src: &[u8]) -> Result<()>;

    /// Logically reset the region; contents become unspecified
    fn free(&self) -> Result<()>;

    /// Release the underlying resource. Later I/O fails with `Closed`.
    fn close(&self) -> Result<()>;

    /// Region size in bytes
    fn capacity(&self) -> u64;
}

/// Open a backend of the given mode for block `index` under `dir`
pub fn open_store(
    mode: StorageMode,
    dir: &Path,
    index: u32,
    capacity: u64,
) -> Result<Box<dyn ByteStore>> {
    let store: Box<dyn ByteStore> = match mode {
        StorageMode::PureFile => Box::new(FileStore::create(&block_path(dir, index), capacity)?),
        StorageMode::MemoryMapped => {
            Box::new(MmapStore::create(&block_path(dir, index), capacity)?)
        }
        StorageMode::OffHeap => Box::new(OffHeapStore::new(capacity)?),
    };
    Ok(store)
}

/// File path for the block with the given index
/// 7 → "{dir}/block_000007.blk"
pub fn block_path(dir: &Path, index: u32) -> std::path::PathBuf {
    dir.join(format!("block_{:06}.blk", index))
}

/// Reject an access of `len` bytes at `offset` that leaves the region
pub(crate) fn check_bounds(offset: u64, len: usize, capacity: u64) -> Result<()> {
    let len = len as u64;
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(CacheError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}
