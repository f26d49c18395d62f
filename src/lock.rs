//! Striped reader-writer lock
//!
//! A fixed power-of-two array of `RwLock<()>`. A key maps to one stripe by
//! `id & (N - 1)`, where `id` is the 31-bit JS-hash of its bytes. Keys on
//! different stripes never contend; keys sharing a stripe serialize.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::key::js_hash;

/// Power-of-two array of reader-writer locks
pub struct StripedRwLock {
    locks: Box<[RwLock<()>]>,
    mask: u32,
}

impl StripedRwLock {
    /// Create `2^level` stripes
    pub fn new(level: u32) -> Self {
        let count = 1usize << level;
        let locks = (0..count).map(|_| RwLock::new(())).collect::<Vec<_>>();
        Self {
            locks: locks.into_boxed_slice(),
            mask: (count - 1) as u32,
        }
    }

    pub fn stripe_count(&self) -> usize {
        self.locks.len()
    }

    /// Stripe selected by a lock id
    pub fn stripe_of(&self, id: u32) -> usize {
        (id & self.mask) as usize
    }

    /// Lock id for key bytes
    pub fn id_of(key: &[u8]) -> u32 {
        js_hash(key)
    }

    /// Shared lock on the stripe for `id`
    pub fn read(&self, id: u32) -> RwLockReadGuard<'_, ()> {
        self.locks[self.stripe_of(id)].read()
    }

    /// Exclusive lock on the stripe for `id`
    pub fn write(&self, id: u32) -> RwLockWriteGuard<'_, ()> {
        self.locks[self.stripe_of(id)].write()
    }

    /// Exclusive lock on one stripe by its position
    pub fn write_stripe(&self, stripe: usize) -> RwLockWriteGuard<'_, ()> {
        self.locks[stripe].write()
    }

    /// Exclusive lock on every stripe, always taken in stripe order
    pub fn write_all(&self) -> Vec<RwLockWriteGuard<'_, ()>> {
        self.locks.iter().map(|lock| lock.write()).collect()
    }
}
