//! Storage Manager
//!
//! Owns the pool of blocks and routes new records to the active block.
//!
//! ## Responsibilities
//! - Create blocks on demand (file per block, named by index)
//! - Rotate the active block when it fills up
//! - Hand out dirty used blocks for compaction
//! - Return fully dead used blocks to the free queue
//!
//! ## Block Lifecycle
//! ```text
//!   Free ──select──▶ Active ──rotate──▶ Used ──live bytes = 0──▶ Free
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::{Config, StorageMode};
use crate::error::{CacheError, Result};

use super::backend;
use super::{Block, Pointer, PAYLOAD_START};

/// Manages the block pool
///
/// ## Concurrency:
/// - `active`: RwLock. Every store into the active block holds the read
///   guard, so a block rotated out (or reset by `free_all`) has no writer
///   left once the write guard is taken. Used blocks are therefore frozen.
/// - `rotation`: serializes active block rotation
/// - `monitor`: serializes `clean` / `recycle` / `free_all`
/// - Lock order: rotation → active → monitor → used → free
pub struct StorageManager {
    /// Directory where block files live
    dir: PathBuf,
    capacity_per_block: u64,
    storage_mode: StorageMode,
    dirty_ratio_threshold: f64,

    /// Blocks that may still use `storage_mode`; later blocks fall back to PureFile
    special_mode_budget: AtomicUsize,

    /// Blocks ever created (also the next block index)
    block_count: AtomicU32,

    /// The block receiving all new records
    active: RwLock<Arc<Block>>,
    rotation: Mutex<()>,

    /// Frozen blocks in the order they stopped being active
    used: Mutex<VecDeque<Arc<Block>>>,

    /// Free blocks, smallest index first
    free: Mutex<BinaryHeap<FreeBlock>>,

    monitor: Mutex<()>,
    closed: AtomicBool,
}

impl StorageManager {
    /// Create the block pool described by `config`
    ///
    /// Any existing content of `config.dir` is deleted first.
    pub fn open(config: &Config) -> Result<Self> {
        let dir = config.dir.clone();
        if dir.exists() {
            if !dir.is_dir() {
                return Err(CacheError::BadArgument(format!(
                    "cache path {} is not a directory",
                    dir.display()
                )));
            }
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let special_mode_budget = AtomicUsize::new(match config.storage_mode {
            StorageMode::PureFile => 0,
            _ => (config.max_off_heap_bytes / config.capacity_per_block) as usize,
        });

        let mut free = BinaryHeap::with_capacity(config.initial_number_of_blocks);
        for index in 0..config.initial_number_of_blocks as u32 {
            let mode = select_mode(config.storage_mode, &special_mode_budget);
            free.push(FreeBlock(new_block(&dir, index, mode, config.capacity_per_block)?));
        }

        let FreeBlock(first) = free.pop().ok_or_else(|| {
            CacheError::Config("initial_number_of_blocks must be > 0".to_string())
        })?;
        first.set_active()?;

        debug!(
            dir = %dir.display(),
            blocks = config.initial_number_of_blocks,
            capacity = config.capacity_per_block,
            mode = ?config.storage_mode,
            "storage manager opened"
        );

        Ok(Self {
            dir,
            capacity_per_block: config.capacity_per_block,
            storage_mode: config.storage_mode,
            dirty_ratio_threshold: config.dirty_ratio_threshold,
            special_mode_budget,
            block_count: AtomicU32::new(config.initial_number_of_blocks as u32),
            active: RwLock::new(first),
            rotation: Mutex::new(()),
            used: Mutex::new(VecDeque::new()),
            free: Mutex::new(free),
            monitor: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Store a record in the active block, rotating to a fresh block on overflow
    pub fn store(
        &self,
        key: &[u8],
        value: &[u8],
        ttl: i64,
        last_access_time: i64,
    ) -> Result<Arc<Pointer>> {
        let item_size = key.len() as u64 + value.len() as u64;
        if item_size > self.capacity_per_block - PAYLOAD_START as u64 {
            return Err(CacheError::BadArgument(format!(
                "record of {} bytes does not fit in an empty block",
                item_size
            )));
        }

        // Fast path: no rotation lock
        {
            let active = self.active.read();
            if let Some(pointer) = active.store(key, value, ttl, last_access_time)? {
                return Ok(pointer);
            }
        }

        let _rotation = self.rotation.lock();

        // Another thread may already have rotated
        {
            let active = self.active.read();
            if let Some(pointer) = active.store(key, value, ttl, last_access_time)? {
                return Ok(pointer);
            }
        }

        let next = self.take_free_block()?;
        let pointer = match next
            .set_active()
            .and_then(|()| next.store(key, value, ttl, last_access_time))
        {
            Ok(pointer) => pointer,
            Err(e) => {
                self.return_free_block(next);
                return Err(e);
            }
        };

        let previous = {
            let mut active = self.active.write();
            std::mem::replace(&mut *active, Arc::clone(&next))
        };
        previous.set_used()?;
        debug!(
            from = previous.index(),
            to = next.index(),
            used_bytes = previous.used_bytes(),
            dirty_bytes = previous.dirty_bytes(),
            "active block rotated"
        );
        self.used.lock().push_back(previous);

        pointer.ok_or_else(|| {
            CacheError::BadArgument(format!(
                "record of {} bytes does not fit in an empty block",
                item_size
            ))
        })
    }

    /// Read the value a pointer refers to
    pub fn retrieve(&self, pointer: &Pointer) -> Result<Vec<u8>> {
        pointer.block().retrieve(pointer)
    }

    /// Retire a record; returns the bytes freed in its block
    pub fn mark_dirty(&self, pointer: &Pointer) -> Result<u64> {
        pointer.block().mark_dirty(pointer)
    }

    /// Read a record's value, then retire it
    ///
    /// The record is retired even when the read fails; the first error wins.
    pub fn remove(&self, pointer: &Pointer) -> Result<Vec<u8>> {
        let value = self.retrieve(pointer);
        let retired = self.mark_dirty(pointer);
        let value = value?;
        retired?;
        Ok(value)
    }

    // =========================================================================
    // Reclamation
    // =========================================================================

    /// Used blocks whose dirty ratio exceeds the threshold
    pub fn dirty_blocks(&self) -> Vec<Arc<Block>> {
        self.used
            .lock()
            .iter()
            .filter(|block| block.dirty_ratio() > self.dirty_ratio_threshold)
            .cloned()
            .collect()
    }

    /// Move every used block without live bytes to the free queue
    ///
    /// Returns the number of blocks freed.
    pub fn clean(&self) -> Result<usize> {
        let _monitor = self.monitor.lock();
        let mut used = self.used.lock();

        let mut freed = 0;
        let mut kept = VecDeque::with_capacity(used.len());
        while let Some(block) = used.pop_front() {
            if block.live_bytes() == 0 {
                block.free()?;
                debug!(block = block.index(), "used block reclaimed");
                self.free.lock().push(FreeBlock(block));
                freed += 1;
            } else {
                kept.push_back(block);
            }
        }
        *used = kept;
        Ok(freed)
    }

    /// Free one used block if nothing in it is live any more
    pub fn recycle(&self, block: &Arc<Block>) -> Result<bool> {
        let _monitor = self.monitor.lock();
        let mut used = self.used.lock();

        if block.live_bytes() != 0 {
            return Ok(false);
        }
        let Some(position) = used.iter().position(|b| Arc::ptr_eq(b, block)) else {
            return Ok(false);
        };
        if let Some(block) = used.remove(position) {
            block.free()?;
            debug!(block = block.index(), "migrated block recycled");
            self.free.lock().push(FreeBlock(block));
        }
        Ok(true)
    }

    /// Reset every block; the active block stays active
    pub fn free_all(&self) -> Result<()> {
        let _rotation = self.rotation.lock();
        let active = self.active.write();
        let _monitor = self.monitor.lock();
        let mut used = self.used.lock();
        let mut free = self.free.lock();

        while let Some(block) = used.pop_front() {
            block.free()?;
            free.push(FreeBlock(block));
        }
        active.free()?;
        active.set_active()?;
        Ok(())
    }

    /// Close every backend and empty the queues
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let _rotation = self.rotation.lock();
        let active = self.active.write();
        let _monitor = self.monitor.lock();
        let mut used = self.used.lock();
        let mut free = self.free.lock();

        let mut result = Ok(());
        for block in used.drain(..).chain(free.drain().map(|FreeBlock(b)| b)) {
            if let Err(e) = block.close() {
                result = Err(e);
            }
        }
        active.close()?;
        result
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The block currently receiving new records
    pub fn active_block(&self) -> Arc<Block> {
        Arc::clone(&self.active.read())
    }

    /// Used blocks plus the active block
    pub fn used_block_count(&self) -> usize {
        self.used.lock().len() + 1
    }

    pub fn free_block_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Blocks ever created
    pub fn total_block_count(&self) -> usize {
        self.block_count.load(Ordering::Acquire) as usize
    }

    /// Record bytes written into the active and used blocks
    pub fn used_bytes(&self) -> u64 {
        let used: u64 = self.used.lock().iter().map(|b| b.used_bytes()).sum();
        used + self.active.read().used_bytes()
    }

    /// Dead record bytes in the active and used blocks
    pub fn dirty_bytes(&self) -> u64 {
        let dirty: u64 = self.used.lock().iter().map(|b| b.dirty_bytes()).sum();
        dirty + self.active.read().dirty_bytes()
    }

    /// Capacity of all blocks ever created
    pub fn capacity(&self) -> u64 {
        self.total_block_count() as u64 * self.capacity_per_block
    }

    pub fn dirty_ratio(&self) -> f64 {
        let capacity = self.capacity();
        if capacity == 0 {
            return 0.0;
        }
        self.dirty_bytes() as f64 / capacity as f64
    }

    /// Get the directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn take_free_block(&self) -> Result<Arc<Block>> {
        let reused = self.free.lock().pop();
        match reused {
            Some(FreeBlock(block)) => Ok(block),
            None => self.create_block(),
        }
    }

    /// Put back a block taken for rotation that never became active
    fn return_free_block(&self, block: Arc<Block>) {
        // free() resets the in-memory state before its I/O can fail
        if let Err(e) = block.free() {
            warn!(block = block.index(), error = %e, "failed to reset block after rotation error");
        }
        self.free.lock().push(FreeBlock(block));
    }

    fn create_block(&self) -> Result<Arc<Block>> {
        let index = self.block_count.fetch_add(1, Ordering::AcqRel);
        let mode = select_mode(self.storage_mode, &self.special_mode_budget);
        new_block(&self.dir, index, mode, self.capacity_per_block)
    }
}

/// Take one slot of the special-mode budget, or fall back to PureFile
fn select_mode(requested: StorageMode, budget: &AtomicUsize) -> StorageMode {
    if requested == StorageMode::PureFile {
        return StorageMode::PureFile;
    }
    match budget.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1)) {
        Ok(_) => requested,
        Err(_) => StorageMode::PureFile,
    }
}

fn new_block(dir: &Path, index: u32, mode: StorageMode, capacity: u64) -> Result<Arc<Block>> {
    let store = backend::open_store(mode, dir, index, capacity)?;
    debug!(block = index, mode = ?mode, "block created");
    Ok(Arc::new(Block::new(index, store)?))
}

/// Free queue entry ordered so the smallest block index pops first
struct FreeBlock(Arc<Block>);

impl PartialEq for FreeBlock {
    fn eq(&self, other: &Self) -> bool {
        self.0.index() == other.0.index()
    }
}

impl Eq for FreeBlock {}

impl PartialOrd for FreeBlock {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for FreeBlock {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap
        other.0.index().cmp(&self.0.index())
    }
}
