//! # BlockCache
//!
//! An embedded key/value byte cache with:
//! - Values stored outside the heap in fixed-size append-only blocks
//!   (plain files, memory-mapped files or owned off-heap buffers)
//! - Time-to-idle expiry refreshed by every read
//! - Striped reader-writer locks for concurrent foreground access
//! - Background expiry and compaction of dirty blocks
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Cache (public API)                      │
//! │           put / get / delete / contains / clear             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ stripe lock (JS-hash of key bytes)
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────────┐
//!   │    Index    │──────────▶│  StorageManager  │
//!   │ key→Pointer │          │ active/used/free │
//!   └─────────────┘          └────────┬─────────┘
//!          ▲                          │
//!          │                          ▼
//!   ┌──────┴──────┐          ┌──────────────────┐
//!   │   Workers   │          │  Blocks          │
//!   │expire/migrate│         │  (ByteStore)     │
//!   └─────────────┘          └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use blockcache::{Cache, Config};
//!
//! let config = Config::builder().dir("/tmp/blockcache").build()?;
//! let cache = Cache::open(config)?;
//!
//! cache.put("user:1", b"alice")?;
//! cache.put_with_ttl("session:9", b"token", Duration::from_secs(30))?;
//! assert_eq!(cache.get("user:1")?, Some(b"alice".to_vec()));
//!
//! cache.close()?;
//! # Ok::<(), blockcache::CacheError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod clock;
pub mod key;
pub mod lock;
pub mod index;
pub mod stats;
pub mod storage;
pub mod cache;

mod worker;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CacheError, Result};
pub use config::{Config, StorageMode};
pub use cache::Cache;
pub use key::{CacheKey, Serialized};
pub use stats::CacheStats;
pub use storage::NEVER_EXPIRE;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of BlockCache
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
