//! Two-tier caching of fetched bytes.
//!
//! - [`MemoryCache`]: LRU under a byte ceiling, purgeable on low memory
//! - [`PersistentStore`]: survives restarts; [`DiskStore`] or [`NoPersistence`]
//! - [`TieredCache`]: read-through over both, write policy per call

mod disk;
mod memory;
mod stats;
mod store;
mod tiered;
mod types;

pub use disk::DiskStore;
pub use memory::MemoryCache;
pub use stats::CacheStats;
pub use store::{BoxFuture, NoPersistence, PersistentStore};
pub use tiered::{MemoryPressureHandler, PendingWrite, TieredCache};
pub use types::{CacheError, CacheKey, StoragePolicy};
