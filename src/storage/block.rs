//! Block
//!
//! One fixed-capacity, append-only record container.
//!
//! ## Allocation
//! Two monotonically increasing offsets are bumped with `fetch_add`: one in
//! the meta region, one in the payload region. A reservation that crosses
//! either region's end fails (OutOfSpace) and is never reused; the block is
//! effectively full from then on. Bytes reserved by a failed allocation are
//! lost until the block is freed.
//!
//! ## Accounting
//! - `used_bytes`: Meta + key + value of every record written this generation
//! - `dirty_bytes`: the part of `used_bytes` no longer reachable from the Index
//!
//! A used block whose live bytes (`used - dirty`) reach zero can be freed.
//!
//! ## Region Lock
//! Writers of single Meta slots (store, tombstone, access time) share the
//! region lock; they never touch the same slot at once because the stripe
//! lock and the pointer mutex order them. Full meta scans and `free` take
//! it exclusively. Payload is written once per generation, before its Meta,
//! so scanned payload is read under the shared lock after re-checking the
//! generation.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;

use super::backend::ByteStore;
use super::meta::{KEY_OFFSET_FIELD, LAST_ACCESS_FIELD};
use super::{
    Item, Meta, Pointer, FLAG_OFFSET, HEAD_SIZE, META_COUNT_OFFSET, META_SIZE, PAYLOAD_START,
};

/// Lifecycle state, mirrored in the head's active flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockState {
    Free = 0,
    Active = 1,
    Used = 2,
}

impl BlockState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => BlockState::Active,
            2 => BlockState::Used,
            _ => BlockState::Free,
        }
    }
}

/// Fixed-capacity append-only record container
pub struct Block {
    /// Monotonically assigned block number (also names the block file)
    index: u32,
    capacity: u64,
    store: Box<dyn ByteStore>,
    state: AtomicU8,
    /// Bumped by every `free`; pointers remember the generation they were stored in
    generation: AtomicU64,
    /// Next Meta slot (absolute offset)
    current_meta_offset: AtomicU64,
    /// Next payload byte (absolute offset)
    current_item_offset: AtomicU64,
    /// Records written this generation
    meta_count: AtomicU32,
    used_bytes: AtomicU64,
    dirty_bytes: AtomicU64,
    /// Shared by slot writers, exclusive for scans and `free`
    region: RwLock<()>,
}

impl Block {
    /// Wrap a backend as a fresh free block
    pub fn new(index: u32, store: Box<dyn ByteStore>) -> Result<Self> {
        let block = Self {
            index,
            capacity: store.capacity(),
            store,
            state: AtomicU8::new(BlockState::Free as u8),
            generation: AtomicU64::new(0),
            current_meta_offset: AtomicU64::new(HEAD_SIZE as u64),
            current_item_offset: AtomicU64::new(PAYLOAD_START as u64),
            meta_count: AtomicU32::new(0),
            used_bytes: AtomicU64::new(0),
            dirty_bytes: AtomicU64::new(0),
            region: RwLock::new(()),
        };
        block.write_head(BlockState::Free, 0)?;
        Ok(block)
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Append a record
    ///
    /// Returns `Ok(None)` when the block has no room left (OutOfSpace).
    pub fn store(
        self: &Arc<Self>,
        key: &[u8],
        value: &[u8],
        ttl: i64,
        last_access_time: i64,
    ) -> Result<Option<Arc<Pointer>>> {
        let item_size = key.len() as u64 + value.len() as u64;
        let _region = self.region.read();

        let meta_offset = self
            .current_meta_offset
            .fetch_add(META_SIZE as u64, Ordering::AcqRel);
        let item_offset = self
            .current_item_offset
            .fetch_add(item_size, Ordering::AcqRel);

        let meta_fits = meta_offset + META_SIZE as u64 <= PAYLOAD_START as u64;
        let item_fits = item_offset + item_size <= self.capacity;

        if !meta_fits {
            return Ok(None);
        }
        if !item_fits {
            // The slot is ours but holds stale bytes from an earlier generation
            self.write_meta(&Meta::tombstone(meta_offset as u32))?;
            return Ok(None);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let meta = Meta {
            offset: meta_offset as u32,
            key_offset: item_offset as u32,
            key_size: key.len() as u32,
            value_size: value.len() as u32,
            last_access_time,
            ttl,
        };

        // Item first so a Meta never describes unwritten payload
        self.store.put(item_offset, key)?;
        self.store.put(item_offset + key.len() as u64, value)?;
        self.write_meta(&meta)?;

        self.meta_count.fetch_add(1, Ordering::AcqRel);
        self.used_bytes
            .fetch_add(META_SIZE as u64 + item_size, Ordering::AcqRel);

        Ok(Some(Arc::new(Pointer::new(
            Arc::clone(self),
            generation,
            meta.offset,
            meta.key_size,
            meta.value_size,
            ttl,
            last_access_time,
        ))))
    }

    /// Read the value a pointer refers to
    pub fn retrieve(&self, pointer: &Pointer) -> Result<Vec<u8>> {
        let mut offset_bytes = [0u8; 4];
        self.store.get(
            pointer.meta_offset() as u64 + KEY_OFFSET_FIELD,
            &mut offset_bytes,
        )?;
        let key_offset = u32::from_le_bytes(offset_bytes) as u64;

        let mut value = vec![0u8; pointer.value_size() as usize];
        self.store
            .get(key_offset + pointer.key_size() as u64, &mut value)?;
        Ok(value)
    }

    /// Retire a record: tombstone its Meta and count its bytes as dirty
    ///
    /// Returns the bytes freed. The payload is left in place, so readers
    /// still holding the pointer can finish. A pointer from an earlier
    /// generation frees nothing.
    ///
    /// The bytes count as dirty even when the tombstone write fails; the
    /// compaction pass skips a stale Meta because the Index no longer
    /// refers to it.
    pub fn mark_dirty(&self, pointer: &Pointer) -> Result<u64> {
        let _region = self.region.read();
        if pointer.generation() != self.generation() {
            return Ok(0);
        }
        let freed = pointer.record_size();
        self.dirty_bytes.fetch_add(freed, Ordering::AcqRel);
        self.write_meta(&Meta::tombstone(pointer.meta_offset()))?;
        Ok(freed)
    }

    /// Persist a refreshed access time into the pointer's Meta
    pub fn write_access_time(&self, pointer: &Pointer, t: i64) -> Result<()> {
        let _region = self.region.read();
        self.store.put(
            pointer.meta_offset() as u64 + LAST_ACCESS_FIELD,
            &t.to_le_bytes(),
        )
    }

    // =========================================================================
    // Meta Scanning (compaction)
    // =========================================================================

    /// Read the `slot`-th Meta of the meta region
    pub fn read_meta(&self, slot: u32) -> Result<Meta> {
        let offset = HEAD_SIZE + slot * META_SIZE;
        let mut buf = [0u8; META_SIZE as usize];
        let _region = self.region.write();
        self.store.get(offset as u64, &mut buf)?;
        Ok(Meta::decode(offset, &buf))
    }

    /// Every Meta that is neither removed nor idle past its ttl at `now`
    pub fn read_all_valid_meta(&self, now: i64) -> Result<Vec<Meta>> {
        let region = {
            let _region = self.region.write();
            let slots = self.allocated_meta_slots();
            if slots == 0 {
                return Ok(Vec::new());
            }
            let mut region = vec![0u8; (slots * META_SIZE) as usize];
            self.store.get(HEAD_SIZE as u64, &mut region)?;
            region
        };

        let metas = region
            .chunks_exact(META_SIZE as usize)
            .enumerate()
            .map(|(slot, bytes)| Meta::decode(HEAD_SIZE + slot as u32 * META_SIZE, bytes))
            .filter(|meta| meta.is_valid(now))
            .collect();
        Ok(metas)
    }

    /// Read the key bytes a scanned Meta describes
    ///
    /// `None` once the block has left `generation`: the payload may
    /// already belong to newer records.
    pub fn read_key(&self, meta: &Meta, generation: u64) -> Result<Option<Vec<u8>>> {
        let _region = self.region.read();
        if self.generation() != generation {
            return Ok(None);
        }
        let mut key = vec![0u8; meta.key_size as usize];
        self.store.get(meta.key_offset as u64, &mut key)?;
        Ok(Some(key))
    }

    /// Read the key and value bytes a scanned Meta describes
    pub fn read_item(&self, meta: &Meta, generation: u64) -> Result<Option<Item>> {
        let _region = self.region.read();
        if self.generation() != generation {
            return Ok(None);
        }
        let mut key = vec![0u8; meta.key_size as usize];
        self.store.get(meta.key_offset as u64, &mut key)?;
        let mut value = vec![0u8; meta.value_size as usize];
        self.store
            .get(meta.key_offset as u64 + meta.key_size as u64, &mut value)?;
        Ok(Some(Item { key, value }))
    }

    /// Meta slots handed out this generation
    fn allocated_meta_slots(&self) -> u32 {
        let end = self
            .current_meta_offset
            .load(Ordering::Acquire)
            .min(PAYLOAD_START as u64);
        ((end - HEAD_SIZE as u64) / META_SIZE as u64) as u32
    }

    // =========================================================================
    // Lifecycle (driven by the StorageManager)
    // =========================================================================

    pub fn set_active(&self) -> Result<()> {
        self.set_state(BlockState::Active)
    }

    pub fn set_used(&self) -> Result<()> {
        self.set_state(BlockState::Used)
    }

    pub fn set_free(&self) -> Result<()> {
        self.set_state(BlockState::Free)
    }

    /// Reset offsets and counters and start a new generation
    pub fn free(&self) -> Result<()> {
        let _region = self.region.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.current_meta_offset
            .store(HEAD_SIZE as u64, Ordering::Release);
        self.current_item_offset
            .store(PAYLOAD_START as u64, Ordering::Release);
        self.meta_count.store(0, Ordering::Release);
        self.used_bytes.store(0, Ordering::Release);
        self.dirty_bytes.store(0, Ordering::Release);
        self.state.store(BlockState::Free as u8, Ordering::Release);
        self.store.free()?;
        self.write_head(BlockState::Free, 0)
    }

    /// Release the backend
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }

    fn set_state(&self, state: BlockState) -> Result<()> {
        self.state.store(state as u8, Ordering::Release);
        self.write_head(state, self.meta_count())
    }

    fn write_head(&self, state: BlockState, meta_count: u32) -> Result<()> {
        self.store.put(FLAG_OFFSET, &[state as u8])?;
        self.store.put(META_COUNT_OFFSET, &meta_count.to_le_bytes())
    }

    fn write_meta(&self, meta: &Meta) -> Result<()> {
        self.store.put(meta.offset as u64, &meta.encode())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn state(&self) -> BlockState {
        BlockState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn meta_count(&self) -> u32 {
        self.meta_count.load(Ordering::Acquire)
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Acquire)
    }

    pub fn dirty_bytes(&self) -> u64 {
        self.dirty_bytes.load(Ordering::Acquire)
    }

    /// Bytes still reachable from the Index
    pub fn live_bytes(&self) -> u64 {
        self.used_bytes().saturating_sub(self.dirty_bytes())
    }

    pub fn dirty_ratio(&self) -> f64 {
        self.dirty_bytes() as f64 / self.capacity as f64
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("index", &self.index)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .field("used_bytes", &self.used_bytes())
            .field("dirty_bytes", &self.dirty_bytes())
            .finish()
    }
}
