//! Cache Module
//!
//! The public cache that coordinates the Index, the stripe locks and the
//! block storage.
//!
//! ## Responsibilities
//! - Validate arguments and route each key to its lock stripe
//! - Store records through the StorageManager and install their Pointers
//! - Keep `used_size` and the operation counters current
//! - Own the background expire / migrate workers
//!
//! ## Write Path
//! ```text
//! put(k, v) ──▶ stripe write lock ──▶ storage.store ──▶ index.put
//!                                                        │
//!                                      old Pointer ◀─────┘
//!                                           │
//!                                           ▼
//!                                  storage.mark_dirty(old)
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::now_millis;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::index::Index;
use crate::key::CacheKey;
use crate::lock::StripedRwLock;
use crate::stats::{CacheStats, Counters};
use crate::storage::{StorageManager, NEVER_EXPIRE};
use crate::worker::{self, Scheduler};

/// Embedded key/value byte cache backed by append-only blocks
///
/// ## Concurrency Model: Striped Reader-Writer Locks
///
/// - **put / delete**: writer lock on the key's stripe
/// - **get**: reader lock on the key's stripe, then the Pointer's own mutex
///   to refresh its access time
/// - **contains / count**: lock free
/// - **clear**: writer lock on every stripe
///
/// Background workers take the same stripe writer locks, so a key's
/// operations form one total order.
pub struct Cache {
    inner: Arc<CacheInner>,
    scheduler: Mutex<Option<Scheduler>>,
}

/// State shared with the background workers
pub(crate) struct CacheInner {
    pub(crate) config: Config,
    pub(crate) storage: StorageManager,
    pub(crate) index: Index,
    pub(crate) locks: StripedRwLock,
    pub(crate) counters: Counters,
    /// Live value bytes
    pub(crate) used_size: AtomicI64,
    closed: AtomicBool,
}

impl CacheInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn add_used_size(&self, bytes: u32) {
        self.used_size.fetch_add(bytes as i64, Ordering::AcqRel);
    }

    pub(crate) fn sub_used_size(&self, bytes: u32) {
        self.used_size.fetch_sub(bytes as i64, Ordering::AcqRel);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(CacheError::Closed);
        }
        Ok(())
    }
}

impl Cache {
    /// Open a cache with the given config
    ///
    /// On startup:
    /// 1. Validate the config
    /// 2. Wipe and recreate the cache directory, create the initial blocks
    /// 3. Start the expire and migrate workers
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Reject out-of-range options
        config.validate()?;

        // Step 2: Block storage (deletes any previous content of dir)
        let storage = StorageManager::open(&config)?;

        let inner = Arc::new(CacheInner {
            locks: StripedRwLock::new(config.concurrency_level),
            index: Index::new(),
            counters: Counters::default(),
            used_size: AtomicI64::new(0),
            closed: AtomicBool::new(false),
            storage,
            config,
        });

        // Step 3: Workers only hold a weak handle
        let scheduler = Scheduler::start(
            Arc::downgrade(&inner),
            Duration::from_millis(inner.config.purge_interval_ms),
            Duration::from_millis(inner.config.migrate_interval_ms),
        )?;

        info!(
            dir = %inner.config.dir.display(),
            stripes = inner.locks.stripe_count(),
            capacity_per_block = inner.config.capacity_per_block,
            "cache opened"
        );

        Ok(Self {
            inner,
            scheduler: Mutex::new(Some(scheduler)),
        })
    }

    /// Open a cache in `dir` with default options
    pub fn open_path(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().dir(dir.as_ref()).build()?)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Store a value that never expires
    pub fn put<K>(&self, key: &K, value: &[u8]) -> Result<()>
    where
        K: CacheKey + ?Sized,
    {
        self.put_internal(key, value, NEVER_EXPIRE)
    }

    /// Store a value that expires once idle for longer than `ttl`
    ///
    /// Every successful `get` restarts the idle clock.
    pub fn put_with_ttl<K>(&self, key: &K, value: &[u8], ttl: Duration) -> Result<()>
    where
        K: CacheKey + ?Sized,
    {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        if ttl_ms <= 0 {
            return Err(CacheError::BadArgument(format!(
                "ttl must be at least 1 ms, got {:?}",
                ttl
            )));
        }
        self.put_internal(key, value, ttl_ms)
    }

    fn put_internal<K>(&self, key: &K, value: &[u8], ttl: i64) -> Result<()>
    where
        K: CacheKey + ?Sized,
    {
        let inner = &self.inner;
        inner.ensure_open()?;

        if value.len() > inner.config.max_value_bytes {
            return Err(CacheError::BadArgument(format!(
                "value of {} bytes exceeds max_value_bytes {}",
                value.len(),
                inner.config.max_value_bytes
            )));
        }
        let key = key.key_bytes()?;

        let _guard = inner.locks.write(StripedRwLock::id_of(&key));

        // Store first: a failed store leaves the previous entry untouched
        let pointer = inner.storage.store(&key, value, ttl, now_millis())?;
        inner.add_used_size(pointer.value_size());

        // The new value is installed; a failed tombstone on the old record
        // still counts its bytes as dirty
        if let Some(old) = inner.index.put(&key, pointer) {
            inner.sub_used_size(old.value_size());
            if let Err(e) = inner.storage.mark_dirty(&old) {
                warn!(block = old.block().index(), error = %e, "failed to retire overwritten record");
            }
        }

        inner.counters.record_put();
        Ok(())
    }

    /// Remove a key, returning the value it held
    pub fn delete<K>(&self, key: &K) -> Result<Option<Vec<u8>>>
    where
        K: CacheKey + ?Sized,
    {
        let inner = &self.inner;
        inner.ensure_open()?;
        let key = key.key_bytes()?;

        let _guard = inner.locks.write(StripedRwLock::id_of(&key));

        let Some(old) = inner.index.remove(&key) else {
            return Ok(None);
        };
        inner.sub_used_size(old.value_size());
        inner.counters.record_delete();

        inner.storage.remove(&old).map(Some)
    }

    /// Drop every entry and reset all blocks
    ///
    /// Storage is reset before the Index is emptied; both happen under
    /// every stripe's writer lock.
    pub fn clear(&self) -> Result<()> {
        let inner = &self.inner;
        inner.ensure_open()?;

        let _all = inner.locks.write_all();
        inner.storage.free_all()?;
        inner.index.clear();
        inner.used_size.store(0, Ordering::Release);

        debug!("cache cleared");
        Ok(())
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Read a value, refreshing its access time
    ///
    /// Returns `None` for absent and expired keys.
    pub fn get<K>(&self, key: &K) -> Result<Option<Vec<u8>>>
    where
        K: CacheKey + ?Sized,
    {
        let inner = &self.inner;
        inner.ensure_open()?;
        let key = key.key_bytes()?;
        inner.counters.record_get();

        let _guard = inner.locks.read(StripedRwLock::id_of(&key));

        let value = match inner.index.get(&key) {
            Some(pointer) => pointer.touch_and_read(now_millis())?,
            None => None,
        };

        match value {
            Some(_) => inner.counters.record_hit(),
            None => inner.counters.record_miss(),
        }
        Ok(value)
    }

    /// Index membership
    ///
    /// No byte I/O and no expiry check: an expired entry that the expire
    /// worker has not yet removed still reports `true`.
    pub fn contains<K>(&self, key: &K) -> Result<bool>
    where
        K: CacheKey + ?Sized,
    {
        self.inner.ensure_open()?;
        let key = key.key_bytes()?;
        Ok(self.inner.index.contains(&key))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop the workers, drop every entry and close all backends
    ///
    /// Every later call on this cache fails with [`CacheError::Closed`].
    pub fn close(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return Err(CacheError::Closed);
        }

        if let Some(mut scheduler) = self.scheduler.lock().take() {
            scheduler.shutdown();
        }

        let _all = inner.locks.write_all();
        inner.index.clear();
        inner.used_size.store(0, Ordering::Release);
        inner.storage.close()?;

        info!(dir = %inner.config.dir.display(), "cache closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Run one expire pass on the calling thread
    ///
    /// Returns the number of entries removed.
    pub fn run_expire_pass(&self) -> Result<usize> {
        self.inner.ensure_open()?;
        worker::expire_pass(&self.inner, &AtomicBool::new(false))
    }

    /// Run one migrate pass on the calling thread
    ///
    /// Returns the number of records moved.
    pub fn run_migrate_pass(&self) -> Result<usize> {
        self.inner.ensure_open()?;
        worker::migrate_pass(&self.inner, &AtomicBool::new(false))
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Entries in the Index, expired-but-unswept ones included
    pub fn count(&self) -> usize {
        self.inner.index.len()
    }

    /// Live value bytes
    pub fn used_size(&self) -> u64 {
        self.inner.used_size.load(Ordering::Acquire).max(0) as u64
    }

    pub fn stats(&self) -> CacheStats {
        self.inner
            .counters
            .snapshot(self.count() as u64, self.used_size())
    }

    /// hit / (hit + miss), 0.0 before the first lookup
    pub fn hit_ratio(&self) -> f64 {
        self.stats().hit_ratio()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Used blocks plus the active block
    pub fn used_block_count(&self) -> usize {
        self.inner.storage.used_block_count()
    }

    pub fn free_block_count(&self) -> usize {
        self.inner.storage.free_block_count()
    }

    pub fn total_block_count(&self) -> usize {
        self.inner.storage.total_block_count()
    }

    /// Meta + key + value bytes written into live blocks
    pub fn storage_used_bytes(&self) -> u64 {
        self.inner.storage.used_bytes()
    }

    /// Bytes in live blocks no longer reachable from the Index
    pub fn storage_dirty_bytes(&self) -> u64 {
        self.inner.storage.dirty_bytes()
    }

    pub fn storage_capacity(&self) -> u64 {
        self.inner.storage.capacity()
    }

    pub fn storage_dirty_ratio(&self) -> f64 {
        self.inner.storage.dirty_ratio()
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.get_mut().take() {
            scheduler.shutdown();
        }
    }
}
