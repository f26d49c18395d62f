//! Meta and Item records
//!
//! A Meta is the fixed-size header for one record, stored in the block's
//! meta region. The Item (key bytes then value bytes) lives in the payload
//! region at `key_offset`.

use super::{DELETE_MARKER, META_SIZE, NEVER_EXPIRE};

// Field offsets inside one Meta record
pub(crate) const KEY_OFFSET_FIELD: u64 = 0;
pub(crate) const KEY_SIZE_FIELD: u64 = 4;
pub(crate) const VALUE_SIZE_FIELD: u64 = 8;
pub(crate) const LAST_ACCESS_FIELD: u64 = 12;
pub(crate) const TTL_FIELD: u64 = 20;

/// Decoded Meta record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    /// Position of this Meta from the block start
    pub offset: u32,
    /// Position of the key bytes from the block start
    pub key_offset: u32,
    pub key_size: u32,
    pub value_size: u32,
    /// Millis since epoch
    pub last_access_time: i64,
    /// Millis; `NEVER_EXPIRE` or a positive idle limit, 0 once removed
    pub ttl: i64,
}

impl Meta {
    /// Meta for a removed record or an abandoned slot
    pub(crate) fn tombstone(offset: u32) -> Self {
        Self {
            offset,
            key_offset: 0,
            key_size: 0,
            value_size: 0,
            last_access_time: 0,
            ttl: DELETE_MARKER,
        }
    }

    /// Encode to the on-disk form
    pub fn encode(&self) -> [u8; META_SIZE as usize] {
        let mut buf = [0u8; META_SIZE as usize];
        put(&mut buf, KEY_OFFSET_FIELD, &self.key_offset.to_le_bytes());
        put(&mut buf, KEY_SIZE_FIELD, &self.key_size.to_le_bytes());
        put(&mut buf, VALUE_SIZE_FIELD, &self.value_size.to_le_bytes());
        put(&mut buf, LAST_ACCESS_FIELD, &self.last_access_time.to_le_bytes());
        put(&mut buf, TTL_FIELD, &self.ttl.to_le_bytes());
        buf
    }

    /// Decode the Meta stored at `offset`
    ///
    /// `bytes` must hold at least `META_SIZE` bytes.
    pub fn decode(offset: u32, bytes: &[u8]) -> Self {
        Self {
            offset,
            key_offset: u32::from_le_bytes(field(bytes, KEY_OFFSET_FIELD)),
            key_size: u32::from_le_bytes(field(bytes, KEY_SIZE_FIELD)),
            value_size: u32::from_le_bytes(field(bytes, VALUE_SIZE_FIELD)),
            last_access_time: i64::from_le_bytes(field(bytes, LAST_ACCESS_FIELD)),
            ttl: i64::from_le_bytes(field(bytes, TTL_FIELD)),
        }
    }

    /// True once the record was removed (or its slot abandoned)
    pub fn is_tombstone(&self) -> bool {
        self.ttl == DELETE_MARKER
    }

    /// Live and not idle past its ttl at `now`
    pub fn is_valid(&self, now: i64) -> bool {
        if self.is_tombstone() {
            return false;
        }
        self.ttl == NEVER_EXPIRE || now.saturating_sub(self.last_access_time) < self.ttl
    }

    /// Key + value bytes
    pub fn item_size(&self) -> u64 {
        self.key_size as u64 + self.value_size as u64
    }
}

/// A record body read back from a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

fn put(buf: &mut [u8], at: u64, src: &[u8]) {
    let at = at as usize;
    buf[at..at + src.len()].copy_from_slice(src);
}

fn field<const N: usize>(bytes: &[u8], at: u64) -> [u8; N] {
    let at = at as usize;
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}
