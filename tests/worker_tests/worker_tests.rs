//! Tests for the expire and migrate workers
//!
//! These tests verify:
//! - Expire passes remove exactly the expired entries
//! - Migrate passes move live records and recycle drained blocks
//! - Records that are expired or changed are never moved
//! - The background scheduler runs both passes on its own

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use blockcache::{Cache, Config, StorageMode};
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;
const IDLE_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Values of this size fill a 16 MiB block's payload after 12 records
const BIG: usize = 1_000_000;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_cache(dir: &Path, purge_ms: u64, migrate_ms: u64, threshold: f64) -> Cache {
    let config = Config::builder()
        .dir(dir.join("cache"))
        .capacity_per_block(16 * MIB)
        .initial_number_of_blocks(1)
        .storage_mode(StorageMode::OffHeap)
        .purge_interval_ms(purge_ms)
        .migrate_interval_ms(migrate_ms)
        .dirty_ratio_threshold(threshold)
        .build()
        .unwrap();
    Cache::open(config).unwrap()
}

fn idle_cache(dir: &Path) -> Cache {
    open_cache(dir, IDLE_INTERVAL_MS, IDLE_INTERVAL_MS, 0.5)
}

fn big_value(seed: usize) -> Vec<u8> {
    (0..BIG).map(|i| ((i + seed) % 253) as u8).collect()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

// =============================================================================
// Expire Pass Tests
// =============================================================================

#[test]
fn test_expire_pass_removes_only_expired() {
    let temp = TempDir::new().unwrap();
    let cache = idle_cache(temp.path());

    cache.put("keep", b"kept").unwrap();
    cache.put_with_ttl("long", b"later", Duration::from_secs(60)).unwrap();
    for i in 0..10 {
        cache
            .put_with_ttl(&format!("short{}", i), b"gone", Duration::from_millis(30))
            .unwrap();
    }
    thread::sleep(Duration::from_millis(80));

    assert_eq!(cache.run_expire_pass().unwrap(), 10);

    assert_eq!(cache.count(), 2);
    assert_eq!(cache.used_size(), 4 + 5);
    assert!(!cache.contains("short0").unwrap());
    assert_eq!(cache.get("keep").unwrap(), Some(b"kept".to_vec()));
    assert_eq!(cache.stats().expire_count, 10);

    // Nothing left to expire
    assert_eq!(cache.run_expire_pass().unwrap(), 0);
}

#[test]
fn test_expire_pass_frees_dead_blocks() {
    let temp = TempDir::new().unwrap();
    let cache = idle_cache(temp.path());

    // Block 0: twelve short-lived records; block 1 becomes active
    for i in 0..12 {
        cache
            .put_with_ttl(&format!("k{}", i), &big_value(i), Duration::from_millis(30))
            .unwrap();
    }
    cache.put("anchor", b"a").unwrap();
    assert_eq!(cache.used_block_count(), 2);
    thread::sleep(Duration::from_millis(80));

    cache.run_expire_pass().unwrap();

    assert_eq!(cache.used_block_count(), 1);
    assert_eq!(cache.free_block_count(), 1);
    assert_eq!(cache.get("anchor").unwrap(), Some(b"a".to_vec()));
}

// =============================================================================
// Migrate Pass Tests
// =============================================================================

#[test]
fn test_migrate_pass_compacts_dirty_block() {
    let temp = TempDir::new().unwrap();
    let cache = idle_cache(temp.path());

    for i in 0..12 {
        cache.put(&format!("k{}", i), &big_value(i)).unwrap();
    }
    // Rotates block 0 out
    cache.put("k12", &big_value(12)).unwrap();

    // 9 of 12 MB dead: above half of the 16 MiB block
    for i in 0..9 {
        cache.delete(&format!("k{}", i)).unwrap();
    }

    assert_eq!(cache.run_migrate_pass().unwrap(), 3);

    assert_eq!(cache.stats().migrate_count, 3);
    assert_eq!(cache.stats().migrate_error_count, 0);
    assert_eq!(cache.used_block_count(), 1);
    assert_eq!(cache.free_block_count(), 1);
    assert_eq!(cache.used_size(), 4 * BIG as u64);
    for i in 9..13 {
        assert_eq!(cache.get(&format!("k{}", i)).unwrap(), Some(big_value(i)));
    }
}

#[test]
fn test_migrate_pass_skips_clean_blocks() {
    let temp = TempDir::new().unwrap();
    let cache = idle_cache(temp.path());

    for i in 0..13 {
        cache.put(&format!("k{}", i), &big_value(i)).unwrap();
    }
    // 3 MB dead is below the threshold
    for i in 0..3 {
        cache.delete(&format!("k{}", i)).unwrap();
    }

    assert_eq!(cache.run_migrate_pass().unwrap(), 0);
    assert_eq!(cache.used_block_count(), 2);
}

#[test]
fn test_migrate_preserves_access_time_and_ttl() {
    let temp = TempDir::new().unwrap();
    let cache = idle_cache(temp.path());
    let values: Vec<Vec<u8>> = (0..12).map(big_value).collect();

    cache
        .put_with_ttl("ttl", &values[0], Duration::from_millis(1_000))
        .unwrap();
    thread::sleep(Duration::from_millis(600));

    for i in 1..12 {
        cache.put(&format!("k{}", i), &values[i]).unwrap();
    }
    cache.put("rotate", b"r").unwrap();
    for i in 1..10 {
        cache.delete(&format!("k{}", i)).unwrap();
    }
    assert_eq!(cache.run_migrate_pass().unwrap(), 3);

    // Idle since the original put, not since the move
    thread::sleep(Duration::from_millis(700));
    assert_eq!(cache.get("ttl").unwrap(), None);
    assert_eq!(cache.get("k10").unwrap(), Some(values[10].clone()));
}

#[test]
fn test_expired_records_are_not_moved() {
    let temp = TempDir::new().unwrap();
    let cache = idle_cache(temp.path());

    for i in 0..12 {
        let key = format!("k{}", i);
        if i < 10 {
            cache.put_with_ttl(&key, &big_value(i), Duration::from_millis(30)).unwrap();
        } else {
            cache.put(&key, &big_value(i)).unwrap();
        }
    }
    cache.put("rotate", b"r").unwrap();
    thread::sleep(Duration::from_millis(80));

    // Not dirty yet: the expired entries are still indexed
    assert_eq!(cache.run_migrate_pass().unwrap(), 0);
    assert_eq!(cache.used_block_count(), 2);

    // Expire marks them dirty; migrate moves the two survivors
    assert_eq!(cache.run_expire_pass().unwrap(), 10);
    assert_eq!(cache.run_migrate_pass().unwrap(), 2);
    assert_eq!(cache.used_block_count(), 1);
    assert_eq!(cache.used_size(), 2 * BIG as u64 + 1);
}

// =============================================================================
// Scheduler Tests
// =============================================================================

#[test]
fn test_background_expiry() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(temp.path(), 50, IDLE_INTERVAL_MS, 0.5);

    cache.put("a", b"X").unwrap();
    cache
        .put_with_ttl("b", b"Y", Duration::from_millis(100))
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || cache.count() == 1));
    assert_eq!(cache.used_size(), 1);
    assert!(cache.stats().expire_count >= 1);
}

#[test]
fn test_background_compaction() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache(temp.path(), IDLE_INTERVAL_MS, 50, 0.5);

    for i in 0..13 {
        cache.put(&format!("k{}", i), &big_value(i)).unwrap();
    }
    for i in 0..10 {
        cache.delete(&format!("k{}", i)).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || cache.used_block_count() == 1));
    // Three if the pass ran before the last delete
    assert!(cache.stats().migrate_count >= 2);
    for i in 10..13 {
        assert_eq!(cache.get(&format!("k{}", i)).unwrap(), Some(big_value(i)));
    }
}

#[test]
fn test_hot_key_survives_continuous_migration() {
    let temp = TempDir::new().unwrap();
    let cache = Arc::new(open_cache(temp.path(), IDLE_INTERVAL_MS, 10, 0.0));
    let running = Arc::new(AtomicBool::new(true));

    let writer = {
        let cache = Arc::clone(&cache);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut last = Vec::new();
            let mut n = 0u64;
            while running.load(Ordering::Relaxed) {
                let mut value = n.to_be_bytes().to_vec();
                value.resize(4096, (n % 251) as u8);
                cache.put("k", &value).unwrap();
                last = value;
                n += 1;
            }
            last
        })
    };

    thread::sleep(Duration::from_millis(1_000));
    running.store(false, Ordering::Relaxed);
    let last = writer.join().unwrap();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(cache.get("k").unwrap(), Some(last));
    assert_eq!(cache.count(), 1);
    assert_eq!(cache.stats().migrate_error_count, 0);
}
