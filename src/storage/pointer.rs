//! Pointer
//!
//! In-memory locator for one live record; the Index value type.
//!
//! A Pointer is immutable apart from its access time. Moving a record
//! (compaction) or overwriting a key installs a new `Arc<Pointer>` in the
//! Index; readers that already cloned the old handle finish on the old
//! record, whose bytes stay intact until the whole block is reclaimed.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

use super::{Block, META_SIZE};

/// Locator for one record inside a block
pub struct Pointer {
    block: Arc<Block>,
    /// Block generation at store time; a freed block bumps its generation
    generation: u64,
    meta_offset: u32,
    key_size: u32,
    value_size: u32,
    ttl: i64,
    /// Per-pointer mutex: serializes access-time updates with reads
    last_access: Mutex<i64>,
}

impl Pointer {
    pub(crate) fn new(
        block: Arc<Block>,
        generation: u64,
        meta_offset: u32,
        key_size: u32,
        value_size: u32,
        ttl: i64,
        last_access_time: i64,
    ) -> Self {
        Self {
            block,
            generation,
            meta_offset,
            key_size,
            value_size,
            ttl,
            last_access: Mutex::new(last_access_time),
        }
    }

    /// Owning block
    pub fn block(&self) -> &Arc<Block> {
        &self.block
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn meta_offset(&self) -> u32 {
        self.meta_offset
    }

    pub fn key_size(&self) -> u32 {
        self.key_size
    }

    pub fn value_size(&self) -> u32 {
        self.value_size
    }

    /// Key + value bytes
    pub fn item_size(&self) -> u64 {
        self.key_size as u64 + self.value_size as u64
    }

    /// Meta + key + value bytes
    pub fn record_size(&self) -> u64 {
        META_SIZE as u64 + self.item_size()
    }

    pub fn ttl(&self) -> i64 {
        self.ttl
    }

    /// Millis since epoch, or -1 if never set
    pub fn last_access_time(&self) -> i64 {
        *self.last_access.lock()
    }

    /// True when idle for longer than the ttl at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        expired(self.ttl, *self.last_access.lock(), now)
    }

    /// Move the access time forward to `t`
    ///
    /// An uninitialized time is always set. Otherwise the time only grows,
    /// and an entry that has already expired at `t` cannot be revived.
    pub fn set_last_access_time(&self, t: i64) -> bool {
        let mut last = self.last_access.lock();
        apply_access_time(self.ttl, &mut last, t)
    }

    /// Refresh the access time to `now` and read the value
    ///
    /// Returns `None` when the entry has expired. The refreshed time is
    /// persisted into the Meta so compaction sees the true idle time. A
    /// failed read or persist leaves the access time unchanged.
    pub fn touch_and_read(&self, now: i64) -> Result<Option<Vec<u8>>> {
        let mut last = self.last_access.lock();
        if expired(self.ttl, *last, now) {
            return Ok(None);
        }
        let value = self.block.retrieve(self)?;

        let mut refreshed = *last;
        if apply_access_time(self.ttl, &mut refreshed, now) {
            self.block.write_access_time(self, now)?;
            *last = refreshed;
        }
        Ok(Some(value))
    }

    /// Same record: same block, generation and meta slot
    pub fn same_record(&self, block: &Arc<Block>, generation: u64, meta_offset: u32) -> bool {
        Arc::ptr_eq(&self.block, block)
            && self.generation == generation
            && self.meta_offset == meta_offset
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pointer")
            .field("block", &self.block.index())
            .field("generation", &self.generation)
            .field("meta_offset", &self.meta_offset)
            .field("key_size", &self.key_size)
            .field("value_size", &self.value_size)
            .field("ttl", &self.ttl)
            .field("last_access_time", &self.last_access_time())
            .finish()
    }
}

fn expired(ttl: i64, last_access: i64, now: i64) -> bool {
    ttl > 0 && last_access >= 0 && now - last_access > ttl
}

fn apply_access_time(ttl: i64, last: &mut i64, t: i64) -> bool {
    if *last < 0 {
        *last = t;
        return true;
    }
    if t > *last && !expired(ttl, *last, t) {
        *last = t;
        return true;
    }
    false
}
