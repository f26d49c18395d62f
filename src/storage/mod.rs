//! Storage Module
//!
//! Append-only block storage for cached records.
//!
//! ## Responsibilities
//! - Byte I/O over fixed-capacity regions (file, mmap, off-heap)
//! - Bump allocation of records inside the active block
//! - Dirty/used accounting per block for compaction decisions
//! - Free/active/used block lifecycle
//!
//! ## Block Layout (little-endian)
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ Head (5 bytes)                                       │
//! │   ActiveFlag: u8 (0=free 1=active 2=used)            │
//! │   MetaCount:  u32                                    │
//! ├──────────────────────────────────────────────────────┤
//! │ Meta Region (4 MiB)                                  │
//! │   [KeyOffset: u32][KeySize: u32][ValueSize: u32]     │
//! │   [LastAccess: i64][Ttl: i64]                        │
//! │   ... one 28-byte Meta per record ...                │
//! ├──────────────────────────────────────────────────────┤
//! │ Payload Region (capacity - 5 - 4 MiB)                │
//! │   [Key bytes][Value bytes]                           │
//! │   ... grows upward ...                               │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod backend;
mod block;
mod manager;
mod meta;
mod pointer;

pub use backend::{ByteStore, FileStore, MmapStore, OffHeapStore};
pub use block::{Block, BlockState};
pub use manager::StorageManager;
pub use meta::{Item, Meta};
pub use pointer::Pointer;

// =============================================================================
// Layout Constants
// =============================================================================

/// Head size: ActiveFlag (1) + MetaCount (4) = 5 bytes
pub const HEAD_SIZE: u32 = 5;

/// Offset of the active flag byte in the head
pub(crate) const FLAG_OFFSET: u64 = 0;

/// Offset of the meta count in the head
pub(crate) const META_COUNT_OFFSET: u64 = 1;

/// Size of the meta region that follows the head
pub const META_AREA_SIZE: u32 = 4 * 1024 * 1024;

/// Meta size: KeyOffset (4) + KeySize (4) + ValueSize (4) + LastAccess (8) + Ttl (8)
pub const META_SIZE: u32 = 28;

/// Number of Meta slots in one block
pub const MAX_META_COUNT: u32 = META_AREA_SIZE / META_SIZE;

/// First byte of the payload region
pub const PAYLOAD_START: u32 = HEAD_SIZE + META_AREA_SIZE;

// =============================================================================
// TTL Sentinels
// =============================================================================

/// TTL of an entry that never expires
pub const NEVER_EXPIRE: i64 = -1;

/// TTL written over a record once it is no longer reachable
pub(crate) const DELETE_MARKER: i64 = 0;
