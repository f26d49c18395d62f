//! BlockCache Load Generator
//!
//! Runs a mixed put/get/delete workload against a fresh cache and logs
//! throughput and the final statistics.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use blockcache::{Cache, CacheStats, Config, StorageMode};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

/// BlockCache load generator
#[derive(Parser, Debug)]
#[command(name = "blockcache-bench")]
#[command(about = "Mixed-workload load generator for BlockCache")]
#[command(version)]
struct Args {
    /// Cache directory (wiped on start)
    #[arg(short, long, default_value = "./blockcache_bench")]
    dir: String,

    /// Block backend
    #[arg(short = 'm', long, value_enum, default_value_t = Mode::File)]
    mode: Mode,

    /// Block size in MB
    #[arg(short, long, default_value = "64")]
    block_mb: u64,

    /// Worker threads
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Operations per thread
    #[arg(short, long, default_value = "100000")]
    ops: usize,

    /// Value size in bytes
    #[arg(short, long, default_value = "1024")]
    value_size: usize,

    /// Keys per thread
    #[arg(short, long, default_value = "10000")]
    keys: usize,

    /// Time-to-idle in milliseconds (0 = never expire)
    #[arg(long, default_value = "0")]
    ttl_ms: u64,

    /// Migrate interval in milliseconds
    #[arg(long, default_value = "1000")]
    migrate_ms: u64,

    /// Purge interval in milliseconds
    #[arg(long, default_value = "1000")]
    purge_ms: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    File,
    Mmap,
    Offheap,
}

impl From<Mode> for StorageMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::File => StorageMode::PureFile,
            Mode::Mmap => StorageMode::MemoryMapped,
            Mode::Offheap => StorageMode::OffHeap,
        }
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blockcache=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("BlockCache bench v{}", blockcache::VERSION);
    tracing::info!("Cache directory: {}", args.dir);

    let config = match Config::builder()
        .dir(&args.dir)
        .storage_mode(args.mode.into())
        .capacity_per_block(args.block_mb * 1024 * 1024)
        .initial_number_of_blocks(2)
        .purge_interval_ms(args.purge_ms)
        .migrate_interval_ms(args.migrate_ms)
        .build()
    {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let cache = match Cache::open(config) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            tracing::error!("Failed to open cache: {}", e);
            std::process::exit(1);
        }
    };

    let started = Instant::now();
    let handles: Vec<_> = (0..args.threads)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let ops = args.ops;
            let keys = args.keys.max(1);
            let value = vec![b'a' + (t % 26) as u8; args.value_size];
            let ttl = (args.ttl_ms > 0).then(|| Duration::from_millis(args.ttl_ms));
            thread::spawn(move || run_worker(&cache, t, ops, keys, &value, ttl))
        })
        .collect();

    let mut failed = 0;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("Worker failed: {}", e);
                failed += 1;
            }
            Err(_) => {
                tracing::error!("Worker panicked");
                failed += 1;
            }
        }
    }
    let elapsed = started.elapsed();

    let total_ops = args.threads * args.ops;
    tracing::info!(
        "{} ops in {:.2?} ({:.0} ops/s)",
        total_ops,
        elapsed,
        total_ops as f64 / elapsed.as_secs_f64()
    );
    report(&cache.stats());
    tracing::info!(
        "Blocks: {} used, {} free, {} total; dirty ratio {:.3}",
        cache.used_block_count(),
        cache.free_block_count(),
        cache.total_block_count(),
        cache.storage_dirty_ratio()
    );

    if let Err(e) = cache.close() {
        tracing::error!("Failed to close cache: {}", e);
        std::process::exit(1);
    }
    if failed > 0 {
        std::process::exit(1);
    }
}

/// 50% get, 40% put, 10% delete over this thread's own key range
fn run_worker(
    cache: &Cache,
    thread_id: usize,
    ops: usize,
    keys: usize,
    value: &[u8],
    ttl: Option<Duration>,
) -> blockcache::Result<()> {
    for i in 0..ops {
        let key = format!("t{}-k{}", thread_id, i % keys);
        match i % 10 {
            0..=4 => {
                cache.get(&key)?;
            }
            5..=8 => match ttl {
                Some(ttl) => cache.put_with_ttl(&key, value, ttl)?,
                None => cache.put(&key, value)?,
            },
            _ => {
                cache.delete(&key)?;
            }
        }
    }
    Ok(())
}

fn report(stats: &CacheStats) {
    tracing::info!(
        "Gets: {} (hit ratio {:.3}), puts: {}, deletes: {}",
        stats.get_count,
        stats.hit_ratio(),
        stats.put_count,
        stats.delete_count
    );
    tracing::info!(
        "Expired: {} ({} errors), migrated: {} ({} errors)",
        stats.expire_count,
        stats.expire_error_count,
        stats.migrate_count,
        stats.migrate_error_count
    );
    tracing::info!("Entries: {}, live value bytes: {}", stats.count, stats.used_size);
}
