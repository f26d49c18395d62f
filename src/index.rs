//! Index
//!
//! Concurrent map from key bytes to the live record's [`Pointer`].
//!
//! Every mutation happens under the key's stripe writer lock; the map's own
//! sharding only protects its internal structure. Conditional operations
//! compare Pointer handles by identity (`Arc::ptr_eq`), so a handle that was
//! replaced in between is never removed or overwritten by mistake.

use std::sync::Arc;

use dashmap::DashMap;

use crate::storage::Pointer;

/// Key bytes → live Pointer
#[derive(Default)]
pub struct Index {
    map: DashMap<Vec<u8>, Arc<Pointer>>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current Pointer for `key`
    pub fn get(&self, key: &[u8]) -> Option<Arc<Pointer>> {
        self.map.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Install `pointer`, returning the Pointer it replaced
    pub fn put(&self, key: &[u8], pointer: Arc<Pointer>) -> Option<Arc<Pointer>> {
        self.map.insert(key.to_vec(), pointer)
    }

    /// Install `new` only if `key` still maps to `current`
    pub fn replace_if_current(
        &self,
        key: &[u8],
        current: &Arc<Pointer>,
        new: Arc<Pointer>,
    ) -> bool {
        match self.map.get_mut(key) {
            Some(mut entry) if Arc::ptr_eq(entry.value(), current) => {
                *entry.value_mut() = new;
                true
            }
            _ => false,
        }
    }

    /// Remove `key` only if it still maps to `current`
    pub fn remove_if_current(&self, key: &[u8], current: &Arc<Pointer>) -> bool {
        self.map
            .remove_if(key, |_, pointer| Arc::ptr_eq(pointer, current))
            .is_some()
    }

    /// Remove `key`, returning its Pointer
    pub fn remove(&self, key: &[u8]) -> Option<Arc<Pointer>> {
        self.map.remove(key).map(|(_, pointer)| pointer)
    }

    /// Membership only; no expiry check
    pub fn contains(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    /// Weakly consistent snapshot of the keys
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Weakly consistent snapshot of the keys whose Pointer satisfies `pred`
    pub fn keys_where<F>(&self, mut pred: F) -> Vec<Vec<u8>>
    where
        F: FnMut(&Pointer) -> bool,
    {
        self.map
            .iter()
            .filter(|entry| pred(entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }
}
