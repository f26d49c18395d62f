//! Error types for BlockCache
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using CacheError
pub type Result<T> = std::result::Result<T, CacheError>;

/// Unified error type for BlockCache operations
#[derive(Debug, Error)]
pub enum CacheError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Access out of bounds: offset {offset} + len {len} exceeds capacity {capacity}")]
    OutOfBounds { offset: u64, len: u64, capacity: u64 },

    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    #[error("Bad argument: {0}")]
    BadArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // State Errors
    // -------------------------------------------------------------------------
    #[error("Cache is closed")]
    Closed,
}

impl CacheError {
    /// True for errors raised by the caller's own arguments
    pub fn is_bad_argument(&self) -> bool {
        matches!(
            self,
            CacheError::BadArgument(_) | CacheError::Config(_) | CacheError::Serialization(_)
        )
    }

    /// True for backend read/write failures
    pub fn is_storage_io(&self) -> bool {
        matches!(self, CacheError::Io(_) | CacheError::OutOfBounds { .. })
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}
