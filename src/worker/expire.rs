//! Expire pass

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::cache::CacheInner;
use crate::clock::now_millis;
use crate::error::Result;
use crate::lock::StripedRwLock;

/// Remove every expired entry; returns the number removed
///
/// Keys are grouped by lock stripe so each stripe's writer lock is taken
/// once per pass. `stop` is polled between stripes.
pub(crate) fn expire_pass(cache: &CacheInner, stop: &AtomicBool) -> Result<usize> {
    let started = now_millis();

    // Step 1: Weakly consistent snapshot of the expired keys
    let candidates = cache.index.keys_where(|pointer| pointer.is_expired(started));

    // Step 2: Bucket by stripe
    let mut buckets: HashMap<usize, Vec<Vec<u8>>> = HashMap::new();
    for key in candidates {
        let stripe = cache.locks.stripe_of(StripedRwLock::id_of(&key));
        buckets.entry(stripe).or_default().push(key);
    }

    // Step 3: One writer lock per bucket; re-check every key under it
    let mut expired = 0;
    for (stripe, keys) in buckets {
        if stop.load(Ordering::Acquire) {
            debug!("expire pass interrupted");
            break;
        }

        let _guard = cache.locks.write_stripe(stripe);
        let now = now_millis();
        for key in keys {
            let Some(pointer) = cache.index.get(&key) else {
                continue;
            };
            if !pointer.is_expired(now) || !cache.index.remove_if_current(&key, &pointer) {
                continue;
            }
            cache.sub_used_size(pointer.value_size());

            match cache.storage.mark_dirty(&pointer) {
                Ok(_) => {
                    cache.counters.record_expire();
                    expired += 1;
                }
                Err(e) => {
                    cache.counters.record_expire_error();
                    warn!(block = pointer.block().index(), error = %e, "failed to retire expired record");
                }
            }
        }
    }

    // Step 4: Reclaim fully dead blocks
    let freed = cache.storage.clean()?;
    debug!(expired, freed_blocks = freed, elapsed_ms = now_millis() - started, "expire pass finished");
    Ok(expired)
}
