//! Worker scheduler
//!
//! Two named threads, one per pass, each driven by a crossbeam ticker.
//! Workers hold only a `Weak` handle to the cache: once the cache is gone
//! the next tick fails to upgrade and the thread exits on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::cache::CacheInner;
use crate::error::Result;

use super::{expire_pass, migrate_pass};

type Pass = fn(&CacheInner, &AtomicBool) -> Result<usize>;

/// Handle to the background worker threads
pub(crate) struct Scheduler {
    /// Dropping the sender wakes every worker out of its `select!`
    shutdown: Option<Sender<()>>,
    /// Polled by running passes at bucket / block boundaries
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the expire and migrate workers
    pub(crate) fn start(
        cache: Weak<CacheInner>,
        purge_interval: Duration,
        migrate_interval: Duration,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let stop = Arc::new(AtomicBool::new(false));

        let mut scheduler = Self {
            shutdown: Some(shutdown_tx),
            stop,
            handles: Vec::with_capacity(2),
        };

        for (name, interval, pass) in [
            ("blockcache-expire", purge_interval, expire_pass as Pass),
            ("blockcache-migrate", migrate_interval, migrate_pass as Pass),
        ] {
            let worker = Worker {
                name,
                interval,
                pass,
                cache: Weak::clone(&cache),
                shutdown: shutdown_rx.clone(),
                stop: Arc::clone(&scheduler.stop),
            };
            // On spawn failure the scheduler drops here and joins what started
            let handle = thread::Builder::new()
                .name(name.to_string())
                .spawn(move || worker.run())?;
            scheduler.handles.push(handle);
        }

        Ok(scheduler)
    }

    /// Stop both workers and wait for them
    ///
    /// A pass in progress stops at its next bucket or block boundary.
    pub(crate) fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.shutdown.take();

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    name: &'static str,
    interval: Duration,
    pass: Pass,
    cache: Weak<CacheInner>,
    shutdown: Receiver<()>,
    stop: Arc<AtomicBool>,
}

impl Worker {
    fn run(self) {
        info!(worker = self.name, interval_ms = self.interval.as_millis() as u64, "worker started");
        let ticker = channel::tick(self.interval);

        loop {
            crossbeam::select! {
                recv(self.shutdown) -> _ => break,
                recv(ticker) -> _ => {}
            }
            if self.stop.load(Ordering::Acquire) {
                break;
            }

            let Some(cache) = self.cache.upgrade() else {
                debug!(worker = self.name, "cache dropped");
                break;
            };
            if cache.is_closed() {
                break;
            }

            match (self.pass)(&cache, &self.stop) {
                Ok(n) => debug!(worker = self.name, n, "pass complete"),
                Err(e) => warn!(worker = self.name, error = %e, "pass failed"),
            }
        }

        info!(worker = self.name, "worker stopped");
    }
}
