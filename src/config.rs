//! Configuration for BlockCache
//!
//! Centralized configuration with sensible defaults. All values are
//! validated by [`ConfigBuilder::build`].

use std::path::PathBuf;

use crate::error::{CacheError, Result};
use crate::storage::{HEAD_SIZE, META_AREA_SIZE};

/// 1 MiB
const MIB: u64 = 1024 * 1024;

/// 1 GiB
const GIB: u64 = 1024 * MIB;

/// Smallest permitted block capacity
pub const MIN_CAPACITY_PER_BLOCK: u64 = 16 * MIB;

/// Largest permitted off-heap budget for non-file storage modes
pub const MAX_OFF_HEAP_BYTES: u64 = 10 * GIB;

/// Main configuration for a BlockCache instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory for block files. Wiped when the cache is opened.
    /// Internal structure:
    ///   {dir}/
    ///     ├── block_000000.blk
    ///     ├── block_000001.blk
    ///     └── ...
    pub dir: PathBuf,

    /// Bytes per block (head + meta region + payload region)
    pub capacity_per_block: u64,

    /// Blocks created up front in the free queue
    pub initial_number_of_blocks: usize,

    /// Backend used for new blocks
    pub storage_mode: StorageMode,

    /// Budget for MemoryMapped / OffHeap blocks; blocks beyond it use PureFile
    pub max_off_heap_bytes: u64,

    /// Per-value size cap
    pub max_value_bytes: usize,

    // -------------------------------------------------------------------------
    // Concurrency Configuration
    // -------------------------------------------------------------------------
    /// log2 of the number of lock stripes
    pub concurrency_level: u32,

    // -------------------------------------------------------------------------
    // Background Worker Configuration
    // -------------------------------------------------------------------------
    /// Expire worker period (milliseconds)
    pub purge_interval_ms: u64,

    /// Migrate worker period (milliseconds)
    pub migrate_interval_ms: u64,

    /// A used block is compacted once dirty / capacity exceeds this
    pub dirty_ratio_threshold: f64,
}

/// Byte backend for a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Positional reads/writes on a regular file
    PureFile,

    /// A memory-mapped file
    MemoryMapped,

    /// An anonymous heap allocation owned by the block
    OffHeap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./blockcache_data"),
            capacity_per_block: 128 * MIB,
            initial_number_of_blocks: 8,
            storage_mode: StorageMode::PureFile,
            max_off_heap_bytes: 2 * GIB,
            max_value_bytes: 4 * MIB as usize,
            concurrency_level: 4,
            purge_interval_ms: 5 * 60 * 1000,
            migrate_interval_ms: 10 * 60 * 1000,
            dirty_ratio_threshold: 0.5,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Number of lock stripes (2^concurrency_level)
    pub fn stripe_count(&self) -> usize {
        1usize << self.concurrency_level
    }

    /// Bytes available for key+value records in one block
    pub fn payload_capacity(&self) -> u64 {
        self.capacity_per_block
            .saturating_sub(HEAD_SIZE as u64 + META_AREA_SIZE as u64)
    }

    /// Check every option against its permitted range
    pub fn validate(&self) -> Result<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(CacheError::Config("dir must not be empty".to_string()));
        }

        if self.capacity_per_block < MIN_CAPACITY_PER_BLOCK {
            return Err(CacheError::Config(format!(
                "capacity_per_block must be at least {} bytes, got {}",
                MIN_CAPACITY_PER_BLOCK, self.capacity_per_block
            )));
        }

        // Meta records address the block with u32 offsets
        if self.capacity_per_block > u32::MAX as u64 {
            return Err(CacheError::Config(format!(
                "capacity_per_block must not exceed {} bytes, got {}",
                u32::MAX,
                self.capacity_per_block
            )));
        }

        if self.initial_number_of_blocks == 0 {
            return Err(CacheError::Config(
                "initial_number_of_blocks must be > 0".to_string(),
            ));
        }

        if !(1..=11).contains(&self.concurrency_level) {
            return Err(CacheError::Config(format!(
                "concurrency_level must be between 1 and 11 inclusive, got {}",
                self.concurrency_level
            )));
        }

        if self.purge_interval_ms == 0 || self.migrate_interval_ms == 0 {
            return Err(CacheError::Config(
                "purge_interval_ms and migrate_interval_ms must be > 0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.dirty_ratio_threshold) {
            return Err(CacheError::Config(format!(
                "dirty_ratio_threshold must be in [0.0, 1.0), got {}",
                self.dirty_ratio_threshold
            )));
        }

        if self.max_off_heap_bytes > MAX_OFF_HEAP_BYTES {
            return Err(CacheError::Config(format!(
                "max_off_heap_bytes must not exceed {} bytes, got {}",
                MAX_OFF_HEAP_BYTES, self.max_off_heap_bytes
            )));
        }

        if self.max_value_bytes == 0 || self.max_value_bytes as u64 >= self.payload_capacity() {
            return Err(CacheError::Config(format!(
                "max_value_bytes must be in 1..{}, got {}",
                self.payload_capacity(),
                self.max_value_bytes
            )));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the cache directory
    pub fn dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.dir = path.into();
        self
    }

    /// Set the capacity of each block (in bytes)
    pub fn capacity_per_block(mut self, bytes: u64) -> Self {
        self.config.capacity_per_block = bytes;
        self
    }

    /// Set the number of blocks created at startup
    pub fn initial_number_of_blocks(mut self, count: usize) -> Self {
        self.config.initial_number_of_blocks = count;
        self
    }

    /// Set the storage backend
    pub fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.config.storage_mode = mode;
        self
    }

    /// Set the budget for MemoryMapped / OffHeap blocks (in bytes)
    pub fn max_off_heap_bytes(mut self, bytes: u64) -> Self {
        self.config.max_off_heap_bytes = bytes;
        self
    }

    /// Set the per-value size cap (in bytes)
    pub fn max_value_bytes(mut self, bytes: usize) -> Self {
        self.config.max_value_bytes = bytes;
        self
    }

    /// Set log2 of the lock stripe count
    pub fn concurrency_level(mut self, level: u32) -> Self {
        self.config.concurrency_level = level;
        self
    }

    /// Set the expire worker period (in milliseconds)
    pub fn purge_interval_ms(mut self, ms: u64) -> Self {
        self.config.purge_interval_ms = ms;
        self
    }

    /// Set the migrate worker period (in milliseconds)
    pub fn migrate_interval_ms(mut self, ms: u64) -> Self {
        self.config.migrate_interval_ms = ms;
        self
    }

    /// Set the dirty ratio above which a used block is compacted
    pub fn dirty_ratio_threshold(mut self, ratio: f64) -> Self {
        self.config.dirty_ratio_threshold = ratio;
        self
    }

    /// Validate and return the config
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
