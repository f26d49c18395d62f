//! Migrate (compaction) pass
//!
//! Moves the live records of dirty used blocks into the active block.
//!
//! A record is moved only if the Index still refers to exactly that
//! record (same block, generation and meta slot) once its stripe's writer
//! lock is held. Anything updated, deleted or already expired in between
//! is left alone: the old record is dirty or will be once the expire pass
//! removes it. A block is recycled as soon as none of its bytes are live.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::CacheInner;
use crate::clock::now_millis;
use crate::error::Result;
use crate::lock::StripedRwLock;
use crate::storage::{Block, Meta};

/// Compact every used block above the dirty threshold; returns records moved
pub(crate) fn migrate_pass(cache: &CacheInner, stop: &AtomicBool) -> Result<usize> {
    let started = now_millis();
    let dirty = cache.storage.dirty_blocks();

    let mut moved = 0;
    let mut recycled = 0;
    for block in &dirty {
        if stop.load(Ordering::Acquire) {
            debug!("migrate pass interrupted");
            break;
        }

        let generation = block.generation();
        let metas = match block.read_all_valid_meta(now_millis()) {
            Ok(metas) => metas,
            Err(e) => {
                cache.counters.record_migrate_error();
                warn!(block = block.index(), error = %e, "failed to scan block metas");
                continue;
            }
        };

        for meta in &metas {
            if stop.load(Ordering::Acquire) || block.generation() != generation {
                break;
            }
            match migrate_one(cache, block, generation, meta) {
                Ok(true) => moved += 1,
                Ok(false) => {}
                // The block was reclaimed under us; its metas are stale
                Err(_) if block.generation() != generation => break,
                Err(e) => {
                    cache.counters.record_migrate_error();
                    warn!(block = block.index(), meta = meta.offset, error = %e, "failed to migrate record");
                }
            }
        }

        if block.generation() == generation && cache.storage.recycle(block)? {
            recycled += 1;
        }
    }

    let freed = cache.storage.clean()?;
    debug!(
        dirty_blocks = dirty.len(),
        moved,
        recycled,
        freed_blocks = freed,
        elapsed_ms = now_millis() - started,
        "migrate pass finished"
    );
    Ok(moved)
}

/// Move one record out of `block`; `false` when it is no longer current
fn migrate_one(cache: &CacheInner, block: &Arc<Block>, generation: u64, meta: &Meta) -> Result<bool> {
    let Some(key) = block.read_key(meta, generation)? else {
        return Ok(false);
    };
    let _guard = cache.locks.write(StripedRwLock::id_of(&key));

    let Some(current) = cache.index.get(&key) else {
        return Ok(false);
    };
    if !current.same_record(block, generation, meta.offset) || current.is_expired(now_millis()) {
        return Ok(false);
    }

    let value = cache.storage.retrieve(&current)?;
    let moved = cache
        .storage
        .store(&key, &value, current.ttl(), current.last_access_time())?;

    if !cache.index.replace_if_current(&key, &current, Arc::clone(&moved)) {
        cache.storage.mark_dirty(&moved)?;
        return Ok(false);
    }
    cache.storage.mark_dirty(&current)?;
    cache.counters.record_migrate();
    Ok(true)
}
