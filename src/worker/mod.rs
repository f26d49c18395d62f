//! Background Workers
//!
//! Two periodic passes keep the block storage compact:
//!
//! - **expire**: removes entries idle past their ttl from the Index and
//!   marks their records dirty
//! - **migrate**: copies the live records out of used blocks whose dirty
//!   ratio exceeds the threshold, then recycles the drained blocks
//!
//! Both passes end by returning every fully dead used block to the free
//! queue. The [`Scheduler`] runs them on two dedicated threads; the cache
//! can also run them synchronously.
//!
//! ```text
//!   blockcache-expire  ──tick(purge_interval)────▶ expire_pass  ─┐
//!                                                                 ├─▶ storage.clean()
//!   blockcache-migrate ──tick(migrate_interval)──▶ migrate_pass ─┘
//! ```

mod expire;
mod migrate;
mod scheduler;

pub(crate) use expire::expire_pass;
pub(crate) use migrate::migrate_pass;
pub(crate) use scheduler::Scheduler;
