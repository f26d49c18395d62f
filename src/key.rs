//! Cache keys
//!
//! A key is an opaque byte sequence compared by bytes. [`CacheKey`] turns
//! common key types into those bytes; [`Serialized`] covers any
//! `serde::Serialize` type by encoding it with bincode.

use std::borrow::Cow;

use serde::Serialize;

use crate::error::Result;

/// Types usable as cache keys
pub trait CacheKey {
    /// The byte form used for equality, hashing and storage
    fn key_bytes(&self) -> Result<Cow<'_, [u8]>>;
}

impl CacheKey for [u8] {
    fn key_bytes(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(self))
    }
}

impl<const N: usize> CacheKey for [u8; N] {
    fn key_bytes(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(self.as_slice()))
    }
}

impl CacheKey for Vec<u8> {
    fn key_bytes(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(self.as_slice()))
    }
}

impl CacheKey for str {
    fn key_bytes(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(self.as_bytes()))
    }
}

impl CacheKey for String {
    fn key_bytes(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(self.as_bytes()))
    }
}

/// Key wrapper for arbitrary serializable types
///
/// Two keys are equal when their bincode encodings are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Serialized<T>(pub T);

impl<T: Serialize> CacheKey for Serialized<T> {
    fn key_bytes(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Owned(bincode::serialize(&self.0)?))
    }
}

/// JS-hash of the key bytes, masked to 31 bits
///
/// Selects the lock stripe for a key. Bytes are mixed as signed values so
/// the hash is stable across platforms.
pub fn js_hash(bytes: &[u8]) -> u32 {
    let mut hash: i32 = 1_315_423_911;
    for &b in bytes {
        let mixed = (hash << 5)
            .wrapping_add(b as i8 as i32)
            .wrapping_add(hash >> 2);
        hash ^= mixed;
    }
    (hash & 0x7FFF_FFFF) as u32
}
