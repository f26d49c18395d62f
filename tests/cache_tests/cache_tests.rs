//! Tests for Cache
//!
//! These tests verify:
//! - put/get/delete round trips and overwrites
//! - Argument validation leaves the cache unchanged
//! - TTL semantics as seen through the public API
//! - Key types
//! - clear, close and statistics

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use blockcache::{Cache, CacheError, CacheStats, Config, Serialized, StorageMode};
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;

/// Long enough that the background workers never run during a test
const IDLE_INTERVAL_MS: u64 = 60 * 60 * 1000;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_cache() -> (TempDir, Cache) {
    setup_temp_cache_with(StorageMode::PureFile)
}

fn setup_temp_cache_with(mode: StorageMode) -> (TempDir, Cache) {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path().join("cache"), mode);
    let cache = Cache::open(config).unwrap();
    (temp_dir, cache)
}

fn test_config(dir: PathBuf, mode: StorageMode) -> Config {
    Config::builder()
        .dir(dir)
        .capacity_per_block(16 * MIB)
        .initial_number_of_blocks(2)
        .storage_mode(mode)
        .purge_interval_ms(IDLE_INTERVAL_MS)
        .migrate_interval_ms(IDLE_INTERVAL_MS)
        .build()
        .unwrap()
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_put_and_get() {
    let (_temp, cache) = setup_temp_cache();

    cache.put("key1", b"value1").unwrap();

    assert_eq!(cache.get("key1").unwrap(), Some(b"value1".to_vec()));
    assert_eq!(cache.count(), 1);
    assert_eq!(cache.used_size(), 6);
}

#[test]
fn test_get_missing_key() {
    let (_temp, cache) = setup_temp_cache();

    assert_eq!(cache.get("nope").unwrap(), None);
    assert_eq!(cache.stats().miss_count, 1);
}

#[test]
fn test_overwrite() {
    let (_temp, cache) = setup_temp_cache();

    cache.put("k", b"first").unwrap();
    cache.put("k", b"second!").unwrap();

    assert_eq!(cache.get("k").unwrap(), Some(b"second!".to_vec()));
    assert_eq!(cache.count(), 1);
    assert_eq!(cache.used_size(), 7);
    assert!(cache.storage_dirty_bytes() > 0);
}

#[test]
fn test_delete_returns_old_value() {
    let (_temp, cache) = setup_temp_cache();

    cache.put("k", b"bytes").unwrap();

    assert_eq!(cache.delete("k").unwrap(), Some(b"bytes".to_vec()));
    assert_eq!(cache.get("k").unwrap(), None);
    assert_eq!(cache.delete("k").unwrap(), None);
    assert_eq!(cache.count(), 0);
    assert_eq!(cache.used_size(), 0);
}

#[test]
fn test_empty_value() {
    let (_temp, cache) = setup_temp_cache();

    cache.put("empty", b"").unwrap();

    assert_eq!(cache.get("empty").unwrap(), Some(Vec::new()));
    assert!(cache.contains("empty").unwrap());
}

#[test]
fn test_largest_allowed_value() {
    let (_temp, cache) = setup_temp_cache();
    let max = cache.config().max_value_bytes;

    let value: Vec<u8> = (0..max).map(|i| (i % 251) as u8).collect();
    cache.put("big", &value).unwrap();

    assert_eq!(cache.get("big").unwrap(), Some(value));
}

#[test]
fn test_many_keys_span_blocks() {
    let (_temp, cache) = setup_temp_cache();
    let value = vec![9u8; 64 * 1024];

    // ~20 MiB of values: more than one block's payload
    for i in 0..320 {
        cache.put(&format!("key{}", i), &value).unwrap();
    }

    assert!(cache.used_block_count() >= 2);
    assert_eq!(cache.count(), 320);
    assert_eq!(cache.used_size(), 320 * value.len() as u64);
    for i in 0..320 {
        assert_eq!(cache.get(&format!("key{}", i)).unwrap().as_deref(), Some(value.as_slice()));
    }
}

// =============================================================================
// Argument Validation Tests
// =============================================================================

#[test]
fn test_value_too_large_rejected() {
    let (_temp, cache) = setup_temp_cache();
    cache.put("k", b"v").unwrap();
    let before = cache.stats();

    let too_big = vec![0u8; cache.config().max_value_bytes + 1];
    let err = cache.put("k", &too_big).unwrap_err();

    assert!(matches!(err, CacheError::BadArgument(_)));
    assert_eq!(cache.get("k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(cache.stats().put_count, before.put_count);
    assert_eq!(cache.used_size(), 1);
}

#[test]
fn test_zero_ttl_rejected() {
    let (_temp, cache) = setup_temp_cache();

    let err = cache.put_with_ttl("k", b"v", Duration::ZERO).unwrap_err();
    assert!(err.is_bad_argument());
    assert!(!cache.contains("k").unwrap());

    let err = cache
        .put_with_ttl("k", b"v", Duration::from_micros(500))
        .unwrap_err();
    assert!(err.is_bad_argument());
}

#[test]
fn test_invalid_config_rejected_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path().join("cache"), StorageMode::PureFile);
    config.concurrency_level = 0;

    assert!(matches!(Cache::open(config), Err(CacheError::Config(_))));
}

// =============================================================================
// TTL Tests
// =============================================================================

#[test]
fn test_expired_entry_is_a_miss() {
    let (_temp, cache) = setup_temp_cache();

    cache.put_with_ttl("short", b"v", Duration::from_millis(50)).unwrap();
    cache.put("forever", b"w").unwrap();
    thread::sleep(Duration::from_millis(120));

    assert_eq!(cache.get("short").unwrap(), None);
    assert_eq!(cache.get("forever").unwrap(), Some(b"w".to_vec()));

    // Still indexed until the expire pass runs
    assert!(cache.contains("short").unwrap());
    assert_eq!(cache.count(), 2);
}

#[test]
fn test_reads_refresh_idle_time() {
    let (_temp, cache) = setup_temp_cache();

    cache.put_with_ttl("k", b"v", Duration::from_millis(300)).unwrap();
    for _ in 0..6 {
        thread::sleep(Duration::from_millis(100));
        assert_eq!(cache.get("k").unwrap(), Some(b"v".to_vec()));
    }
}

#[test]
fn test_put_resets_ttl() {
    let (_temp, cache) = setup_temp_cache();

    cache.put_with_ttl("k", b"v", Duration::from_millis(50)).unwrap();
    cache.put("k", b"w").unwrap();
    thread::sleep(Duration::from_millis(120));

    assert_eq!(cache.get("k").unwrap(), Some(b"w".to_vec()));
}

// =============================================================================
// Key Type Tests
// =============================================================================

#[test]
fn test_keys_compare_by_bytes() {
    let (_temp, cache) = setup_temp_cache();

    cache.put("same", b"1").unwrap();

    assert_eq!(cache.get(&String::from("same")).unwrap(), Some(b"1".to_vec()));
    assert_eq!(cache.get(b"same").unwrap(), Some(b"1".to_vec()));
    assert_eq!(cache.get(&b"same".to_vec()).unwrap(), Some(b"1".to_vec()));
    assert_eq!(cache.get(&b"same"[..]).unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_serialized_keys() {
    let (_temp, cache) = setup_temp_cache();

    cache.put(&Serialized((7u32, "user")), b"seven").unwrap();
    cache.put(&Serialized((8u32, "user")), b"eight").unwrap();

    assert_eq!(
        cache.get(&Serialized((7u32, "user"))).unwrap(),
        Some(b"seven".to_vec())
    );
    assert_eq!(
        cache.delete(&Serialized((8u32, "user"))).unwrap(),
        Some(b"eight".to_vec())
    );
    assert_eq!(cache.count(), 1);
}

// =============================================================================
// Storage Mode Tests
// =============================================================================

#[test]
fn test_round_trip_in_every_mode() {
    for mode in [StorageMode::PureFile, StorageMode::MemoryMapped, StorageMode::OffHeap] {
        let (_temp, cache) = setup_temp_cache_with(mode);

        for i in 0..100u32 {
            cache.put(&i.to_be_bytes(), &vec![i as u8; i as usize]).unwrap();
        }
        for i in 0..100u32 {
            assert_eq!(
                cache.get(&i.to_be_bytes()).unwrap(),
                Some(vec![i as u8; i as usize]),
                "mode {:?}",
                mode
            );
        }
        cache.close().unwrap();
    }
}

// =============================================================================
// clear / close Tests
// =============================================================================

#[test]
fn test_clear() {
    let (_temp, cache) = setup_temp_cache();
    let value = vec![1u8; 1024 * 1024];
    for i in 0..20 {
        cache.put(&format!("k{}", i), &value).unwrap();
    }
    assert!(cache.used_block_count() >= 2);

    cache.clear().unwrap();

    assert_eq!(cache.count(), 0);
    assert_eq!(cache.used_size(), 0);
    assert_eq!(cache.used_block_count(), 1);
    assert_eq!(cache.storage_used_bytes(), 0);
    assert_eq!(cache.get("k0").unwrap(), None);

    // Usable afterwards
    cache.put("k0", b"again").unwrap();
    assert_eq!(cache.get("k0").unwrap(), Some(b"again".to_vec()));
}

#[test]
fn test_close_then_every_call_fails() {
    let (_temp, cache) = setup_temp_cache();
    for i in 0..1_000 {
        cache.put(&format!("k{}", i), b"value").unwrap();
    }

    cache.close().unwrap();

    assert!(cache.is_closed());
    assert!(matches!(cache.put("k1", b"v"), Err(CacheError::Closed)));
    assert!(matches!(cache.put_with_ttl("k1", b"v", Duration::from_secs(1)), Err(CacheError::Closed)));
    assert!(matches!(cache.get("k1"), Err(CacheError::Closed)));
    assert!(matches!(cache.delete("k1"), Err(CacheError::Closed)));
    assert!(matches!(cache.contains("k1"), Err(CacheError::Closed)));
    assert!(matches!(cache.clear(), Err(CacheError::Closed)));
    assert!(matches!(cache.run_expire_pass(), Err(CacheError::Closed)));
    assert!(matches!(cache.run_migrate_pass(), Err(CacheError::Closed)));
    assert!(matches!(cache.close(), Err(CacheError::Closed)));
    assert_eq!(cache.count(), 0);
}

#[test]
fn test_open_path_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("defaults");

    let cache = Cache::open_path(&dir).unwrap();

    assert_eq!(cache.config().dir, dir);
    assert_eq!(cache.total_block_count(), 8);
    assert_eq!(cache.free_block_count(), 7);
    assert_eq!(cache.storage_capacity(), 8 * 128 * MIB);
    cache.close().unwrap();
}

#[test]
fn test_drop_without_close() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .dir(temp_dir.path().join("cache"))
        .capacity_per_block(16 * MIB)
        .initial_number_of_blocks(1)
        .purge_interval_ms(5)
        .migrate_interval_ms(5)
        .build()
        .unwrap();

    let cache = Cache::open(config).unwrap();
    cache.put("k", b"v").unwrap();
    thread::sleep(Duration::from_millis(30));

    // Joins both workers
    drop(cache);
}

// =============================================================================
// Statistics Tests
// =============================================================================

#[test]
fn test_stats() {
    let (_temp, cache) = setup_temp_cache();
    assert_eq!(cache.hit_ratio(), 0.0);
    assert_eq!(cache.stats(), CacheStats::default());

    cache.put("a", b"12").unwrap();
    cache.put("b", b"345").unwrap();
    cache.get("a").unwrap();
    cache.get("a").unwrap();
    cache.get("b").unwrap();
    cache.get("missing").unwrap();
    cache.delete("b").unwrap();

    let stats = cache.stats();
    assert_eq!(stats.put_count, 2);
    assert_eq!(stats.get_count, 4);
    assert_eq!(stats.hit_count, 3);
    assert_eq!(stats.miss_count, 1);
    assert_eq!(stats.hit_count + stats.miss_count, stats.get_count);
    assert_eq!(stats.delete_count, 1);
    assert_eq!(stats.count, 1);
    assert_eq!(stats.used_size, 2);
    assert_eq!(cache.hit_ratio(), 0.75);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_disjoint_keys() {
    let (_temp, cache) = setup_temp_cache();
    let cache = Arc::new(cache);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..2_000 {
                    let key = format!("t{}-{}", t, i % 100);
                    let value = format!("value-{}-{}", t, i).into_bytes();
                    cache.put(&key, &value).unwrap();
                    assert_eq!(cache.get(&key).unwrap(), Some(value));
                    if i % 7 == 0 {
                        assert!(cache.delete(&key).unwrap().is_some());
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(cache.count() <= 800);
}

#[test]
fn test_concurrent_writers_same_key() {
    let (_temp, cache) = setup_temp_cache();
    let cache = Arc::new(cache);

    let handles: Vec<_> = (0..4u8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..500 {
                    cache.put("shared", &[t; 32]).unwrap();
                    let value = cache.get("shared").unwrap().unwrap();
                    // Never torn: one writer's value in full
                    assert_eq!(value.len(), 32);
                    assert!(value.iter().all(|&b| b == value[0]));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(cache.count(), 1);
    assert_eq!(cache.used_size(), 32);
}
