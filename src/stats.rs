//! Cache statistics
//!
//! Counters are plain relaxed atomics. They are monotonic and only
//! eventually consistent with the Index; a [`CacheStats`] snapshot is not
//! transactional with concurrent operations.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live operation counters
#[derive(Debug, Default)]
pub struct Counters {
    hit: AtomicU64,
    miss: AtomicU64,
    get: AtomicU64,
    put: AtomicU64,
    delete: AtomicU64,
    expire: AtomicU64,
    expire_error: AtomicU64,
    migrate: AtomicU64,
    migrate_error: AtomicU64,
}

macro_rules! counter {
    ($incr:ident, $field:ident) => {
        pub fn $incr(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl Counters {
    counter!(record_hit, hit);
    counter!(record_miss, miss);
    counter!(record_get, get);
    counter!(record_put, put);
    counter!(record_delete, delete);
    counter!(record_expire, expire);
    counter!(record_expire_error, expire_error);
    counter!(record_migrate, migrate);
    counter!(record_migrate_error, migrate_error);

    /// Copy the counters; `count` and `used_size` come from the caller
    pub fn snapshot(&self, count: u64, used_size: u64) -> CacheStats {
        CacheStats {
            hit_count: self.hit.load(Ordering::Relaxed),
            miss_count: self.miss.load(Ordering::Relaxed),
            get_count: self.get.load(Ordering::Relaxed),
            put_count: self.put.load(Ordering::Relaxed),
            delete_count: self.delete.load(Ordering::Relaxed),
            expire_count: self.expire.load(Ordering::Relaxed),
            expire_error_count: self.expire_error.load(Ordering::Relaxed),
            migrate_count: self.migrate.load(Ordering::Relaxed),
            migrate_error_count: self.migrate_error.load(Ordering::Relaxed),
            count,
            used_size,
        }
    }
}

/// Point-in-time copy of the cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub get_count: u64,
    pub put_count: u64,
    pub delete_count: u64,
    /// Entries removed by the expire worker
    pub expire_count: u64,
    pub expire_error_count: u64,
    /// Records moved by the migrate worker
    pub migrate_count: u64,
    pub migrate_error_count: u64,
    /// Entries in the Index
    pub count: u64,
    /// Live value bytes
    pub used_size: u64,
}

impl CacheStats {
    /// hit / (hit + miss), or 0.0 before the first lookup
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hit_count + self.miss_count;
        if lookups == 0 {
            return 0.0;
        }
        self.hit_count as f64 / lookups as f64
    }

    /// Field-wise sum; gauges (`count`, `used_size`) come from `other`
    pub fn plus(&self, other: &CacheStats) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count + other.hit_count,
            miss_count: self.miss_count + other.miss_count,
            get_count: self.get_count + other.get_count,
            put_count: self.put_count + other.put_count,
            delete_count: self.delete_count + other.delete_count,
            expire_count: self.expire_count + other.expire_count,
            expire_error_count: self.expire_error_count + other.expire_error_count,
            migrate_count: self.migrate_count + other.migrate_count,
            migrate_error_count: self.migrate_error_count + other.migrate_error_count,
            count: other.count,
            used_size: other.used_size,
        }
    }

    /// Counter deltas since `earlier`; gauges are kept from `self`
    pub fn minus(&self, earlier: &CacheStats) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.saturating_sub(earlier.hit_count),
            miss_count: self.miss_count.saturating_sub(earlier.miss_count),
            get_count: self.get_count.saturating_sub(earlier.get_count),
            put_count: self.put_count.saturating_sub(earlier.put_count),
            delete_count: self.delete_count.saturating_sub(earlier.delete_count),
            expire_count: self.expire_count.saturating_sub(earlier.expire_count),
            expire_error_count: self
                .expire_error_count
                .saturating_sub(earlier.expire_error_count),
            migrate_count: self.migrate_count.saturating_sub(earlier.migrate_count),
            migrate_error_count: self
                .migrate_error_count
                .saturating_sub(earlier.migrate_error_count),
            count: self.count,
            used_size: self.used_size,
        }
    }
}
