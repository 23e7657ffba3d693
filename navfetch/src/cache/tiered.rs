//! Two-tier cache: reclaimable memory in front of a persistent store.
//!
//! ```text
//!   store(k, v, policy)              read(k)
//!        │                              │
//!        ├─► MemoryCache (sync)  ◄──────┤ 1. memory
//!        │                              │
//!        └─► PersistentStore ───────────┘ 2. disk, then repopulate memory
//!            (async, PendingWrite)
//! ```
//!
//! Memory writes complete before `store` returns, so a `read` on the same
//! key right after always sees the new value.
//!
//! Disk work is ordered by clear epochs. Every `clear` starts a new epoch;
//! a queued write from an older epoch is dropped, and writes from the new
//! epoch wait until the clear has finished deleting.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::memory::MemoryCache;
use super::stats::CacheStats;
use super::store::{NoPersistence, PersistentStore};
use super::types::{CacheError, CacheKey, StoragePolicy};

/// Completion of the asynchronous part of a store or clear.
///
/// Dropping it does not cancel the work.
#[must_use = "await `wait` or attach `on_complete` to observe disk errors"]
pub struct PendingWrite {
    task: Option<(JoinHandle<Result<(), CacheError>>, Handle)>,
}

impl PendingWrite {
    /// Nothing to wait for.
    pub fn completed() -> Self {
        Self { task: None }
    }

    fn spawned(task: JoinHandle<Result<(), CacheError>>, runtime: Handle) -> Self {
        Self {
            task: Some((task, runtime)),
        }
    }

    /// True if no background work was started.
    pub fn is_completed(&self) -> bool {
        self.task.is_none()
    }

    /// Wait for the background work.
    pub async fn wait(self) -> Result<(), CacheError> {
        match self.task {
            None => Ok(()),
            Some((task, _)) => task.await.map_err(|e| CacheError::Task(e.to_string()))?,
        }
    }

    /// Invoke `callback` once the background work is done.
    ///
    /// Runs immediately on the calling thread when nothing is pending.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(Result<(), CacheError>) + Send + 'static,
    {
        match self.task {
            None => callback(Ok(())),
            Some((task, runtime)) => {
                runtime.spawn(async move {
                    let result = match task.await {
                        Ok(result) => result,
                        Err(e) => Err(CacheError::Task(e.to_string())),
                    };
                    callback(result);
                });
            }
        }
    }
}

/// Injectable low-memory callback target.
///
/// Holds only a weak reference, so registering it with a platform signal
/// source does not keep the cache alive.
#[derive(Clone)]
pub struct MemoryPressureHandler {
    memory: Weak<MemoryCache>,
}

impl MemoryPressureHandler {
    /// Purge the memory tier, if the cache still exists.
    pub fn on_low_memory(&self) {
        if let Some(memory) = self.memory.upgrade() {
            memory.purge();
        }
    }

    /// The handler as a plain callback.
    pub fn into_callback(self) -> Box<dyn Fn() + Send + Sync> {
        Box::new(move || self.on_low_memory())
    }
}

/// Count of background disk tasks, for [`TieredCache::flush`].
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements on drop, including when the task is aborted.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Orders disk writes against disk clears.
struct DiskOrdering {
    /// Bumped synchronously by every `clear`
    epoch: AtomicU64,
    /// Latest epoch whose clear has finished
    cleared: watch::Sender<u64>,
    /// Shared by writes, exclusive for `delete_all`
    gate: RwLock<()>,
}

impl DiskOrdering {
    fn new() -> Self {
        let (cleared, _) = watch::channel(0);
        Self {
            epoch: AtomicU64::new(0),
            cleared,
            gate: RwLock::new(()),
        }
    }

    fn current(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn clear_pending(&self) -> bool {
        *self.cleared.borrow() < self.current()
    }

    /// Wait until the clear that opened `epoch` has finished.
    async fn wait_cleared(&self, epoch: u64) {
        let mut cleared = self.cleared.subscribe();
        if cleared.wait_for(|done| *done >= epoch).await.is_err() {
            warn!(epoch = epoch, "Clear epoch channel closed");
        }
    }

    fn finish_clear(&self, epoch: u64) {
        self.cleared.send_modify(|done| *done = (*done).max(epoch));
    }
}

/// Memory tier backed by a [`PersistentStore`].
pub struct TieredCache {
    memory: Arc<MemoryCache>,
    store: Arc<dyn PersistentStore>,
    runtime: Handle,
    disk_stats: Arc<Mutex<CacheStats>>,
    in_flight: Arc<InFlight>,
    ordering: Arc<DiskOrdering>,
}

impl TieredCache {
    /// Create a cache with a memory ceiling of `memory_max_bytes`.
    ///
    /// Disk work runs on `runtime`.
    pub fn new(memory_max_bytes: usize, store: Arc<dyn PersistentStore>, runtime: Handle) -> Self {
        info!(
            memory_max_bytes = memory_max_bytes,
            store = store.name(),
            "Tiered cache created"
        );
        Self {
            memory: Arc::new(MemoryCache::new(memory_max_bytes)),
            store,
            runtime,
            disk_stats: Arc::new(Mutex::new(CacheStats::new())),
            in_flight: Arc::new(InFlight::default()),
            ordering: Arc::new(DiskOrdering::new()),
        }
    }

    /// A cache with no persistent tier.
    pub fn memory_only(memory_max_bytes: usize, runtime: Handle) -> Self {
        Self::new(memory_max_bytes, Arc::new(NoPersistence), runtime)
    }

    /// Store `data` under `key` in the tiers selected by `policy`.
    ///
    /// The memory tier is updated before returning; the disk write runs in
    /// the background and is reported through the returned [`PendingWrite`].
    pub fn store(&self, key: CacheKey, data: Bytes, policy: StoragePolicy) -> PendingWrite {
        if policy.includes_memory() {
            self.memory.put(key.clone(), data.clone());
        } else {
            // A disk-only write must not leave an older value readable from memory
            self.memory.remove(&key);
        }

        if !policy.includes_disk() {
            return PendingWrite::completed();
        }

        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.disk_stats);
        let ordering = Arc::clone(&self.ordering);
        let epoch = ordering.current();
        let guard = self.in_flight.enter();
        let task = self.runtime.spawn(async move {
            let _guard = guard;
            ordering.wait_cleared(epoch).await;
            let _shared = ordering.gate.read().await;
            if ordering.current() != epoch {
                debug!(key = %key, "Disk write dropped, cache cleared since it was queued");
                return Ok(());
            }
            match store.put(&key, data).await {
                Ok(()) => {
                    stats.lock().record_disk_write();
                    Ok(())
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Disk cache write failed");
                    stats.lock().record_disk_write_failure();
                    Err(e)
                }
            }
        });
        PendingWrite::spawned(task, self.runtime.clone())
    }

    /// Read through both tiers.
    ///
    /// A persistent-tier hit is copied into memory before returning. Disk
    /// errors are logged and reported as a miss, as is anything read while a
    /// disk clear is pending.
    pub async fn read(&self, key: &CacheKey) -> Option<Bytes> {
        if let Some(data) = self.memory.get(key) {
            return Some(data);
        }

        let epoch = self.ordering.current();
        if self.ordering.clear_pending() {
            self.disk_stats.lock().record_disk_miss();
            return None;
        }

        let result = self.store.get(key).await;
        if self.ordering.current() != epoch {
            self.disk_stats.lock().record_disk_miss();
            return None;
        }

        match result {
            Ok(Some(data)) => {
                self.disk_stats.lock().record_disk_hit();
                debug!(key = %key, bytes = data.len(), "Disk cache hit, repopulating memory");
                self.memory.put(key.clone(), data.clone());
                Some(data)
            }
            Ok(None) => {
                self.disk_stats.lock().record_disk_miss();
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Disk cache read failed");
                let mut stats = self.disk_stats.lock();
                stats.record_disk_read_failure();
                stats.record_disk_miss();
                None
            }
        }
    }

    /// Memory tier only; never does I/O.
    pub fn read_memory(&self, key: &CacheKey) -> Option<Bytes> {
        self.memory.get(key)
    }

    pub fn contains_memory(&self, key: &CacheKey) -> bool {
        self.memory.contains(key)
    }

    /// Remove entries from the tiers selected by `policy`.
    ///
    /// Memory is cleared before returning; disk clearing runs in the
    /// background. Disk writes queued before the call never land after it,
    /// and writes queued after it land once the clear is done.
    pub fn clear(&self, policy: StoragePolicy) -> PendingWrite {
        if policy.includes_memory() {
            self.memory.clear();
            debug!("Memory cache cleared");
        }

        if !policy.includes_disk() {
            return PendingWrite::completed();
        }

        let store = Arc::clone(&self.store);
        let ordering = Arc::clone(&self.ordering);
        let epoch = ordering.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = self.in_flight.enter();
        let task = self.runtime.spawn(async move {
            let _guard = guard;
            // Clears finish in call order
            ordering.wait_cleared(epoch - 1).await;
            let result = {
                let _exclusive = ordering.gate.write().await;
                store.delete_all().await
            };
            ordering.finish_clear(epoch);
            let removed = result?;
            info!(removed = removed, store = store.name(), "Persistent cache cleared");
            Ok(())
        });
        PendingWrite::spawned(task, self.runtime.clone())
    }

    /// Wait until every disk write and clear started so far has finished.
    ///
    /// Work started while waiting is waited for too.
    pub async fn flush(&self) {
        self.in_flight.wait_idle().await;
    }

    /// Background disk tasks not yet finished.
    pub fn pending_disk_tasks(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Drop the memory tier as if the system signalled low memory.
    pub fn purge_memory(&self) {
        self.memory.purge();
    }

    /// Handler to register with whatever delivers low-memory signals.
    pub fn memory_pressure_handler(&self) -> MemoryPressureHandler {
        MemoryPressureHandler {
            memory: Arc::downgrade(&self.memory),
        }
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.memory.stats();
        stats.merge_disk(&self.disk_stats.lock());
        stats
    }

    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            memory_entries = stats.memory_entry_count,
            memory_bytes = stats.memory_size_bytes,
            memory_hit_rate = format!("{:.1}%", stats.memory_hit_rate() * 100.0),
            disk_hit_rate = format!("{:.1}%", stats.disk_hit_rate() * 100.0),
            evictions = stats.memory_evictions,
            purges = stats.memory_purges,
            disk_writes = stats.disk_writes,
            disk_write_failures = stats.disk_write_failures,
            "Cache statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DiskStore;
    use tempfile::TempDir;

    fn disk_cache(dir: &TempDir) -> TieredCache {
        TieredCache::new(
            1024 * 1024,
            Arc::new(DiskStore::new(dir.path())),
            Handle::current(),
        )
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::new(name)
    }

    #[tokio::test]
    async fn test_store_then_read_memory_is_immediate() {
        let dir = TempDir::new().unwrap();
        let cache = disk_cache(&dir);

        let pending = cache.store(key("a"), Bytes::from_static(b"v"), StoragePolicy::MemoryAndDisk);

        // Visible before the disk write has been awaited
        assert_eq!(cache.read_memory(&key("a")), Some(Bytes::from_static(b"v")));
        pending.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_waits_for_dropped_writes() {
        let dir = TempDir::new().unwrap();
        let cache = disk_cache(&dir);

        for name in ["a", "b", "c"] {
            drop(cache.store(key(name), Bytes::from_static(b"v"), StoragePolicy::MemoryAndDisk));
        }
        cache.flush().await;

        assert_eq!(cache.pending_disk_tasks(), 0);
        assert_eq!(cache.stats().disk_writes, 3);

        // Nothing pending returns at once
        cache.flush().await;
    }

    #[tokio::test]
    async fn test_memory_only_store_skips_disk() {
        let dir = TempDir::new().unwrap();
        let cache = disk_cache(&dir);

        let pending = cache.store(key("a"), Bytes::from_static(b"v"), StoragePolicy::MemoryOnly);
        assert!(pending.is_completed());

        cache.purge_memory();
        assert_eq!(cache.read(&key("a")).await, None);
        assert_eq!(cache.stats().disk_writes, 0);
    }

    #[tokio::test]
    async fn test_disk_only_store_repopulates_memory_on_read() {
        let dir = TempDir::new().unwrap();
        let cache = disk_cache(&dir);

        cache
            .store(key("a"), Bytes::from_static(b"v"), StoragePolicy::DiskOnly)
            .wait()
            .await
            .unwrap();
        assert!(!cache.contains_memory(&key("a")));

        assert_eq!(cache.read(&key("a")).await, Some(Bytes::from_static(b"v")));
        assert!(cache.contains_memory(&key("a")));

        let stats = cache.stats();
        assert_eq!(stats.disk_hits, 1);
        assert_eq!(stats.disk_writes, 1);
    }

    #[tokio::test]
    async fn test_purge_keeps_disk_entries() {
        let dir = TempDir::new().unwrap();
        let cache = disk_cache(&dir);

        cache
            .store(key("a"), Bytes::from_static(b"v"), StoragePolicy::MemoryAndDisk)
            .wait()
            .await
            .unwrap();

        let handler = cache.memory_pressure_handler();
        handler.on_low_memory();
        assert_eq!(cache.read_memory(&key("a")), None);

        assert_eq!(cache.read(&key("a")).await, Some(Bytes::from_static(b"v")));
        assert_eq!(cache.read_memory(&key("a")), Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn test_clear_all_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = disk_cache(&dir);

        for name in ["a", "b", "c"] {
            cache
                .store(key(name), Bytes::from_static(b"v"), StoragePolicy::MemoryAndDisk)
                .wait()
                .await
                .unwrap();
        }

        cache.clear(StoragePolicy::MemoryAndDisk).wait().await.unwrap();

        for name in ["a", "b", "c"] {
            assert_eq!(cache.read(&key(name)).await, None);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_clear_wins_over_queued_writes() {
        let dir = TempDir::new().unwrap();
        let cache = disk_cache(&dir);
        let keys: Vec<_> = (0..200).map(|i| key(&format!("k{i}"))).collect();

        for key in &keys {
            drop(cache.store(key.clone(), Bytes::from_static(b"v"), StoragePolicy::MemoryAndDisk));
        }
        cache.clear(StoragePolicy::MemoryAndDisk).wait().await.unwrap();

        for key in &keys {
            assert_eq!(cache.read(key).await, None, "{key} survived clear");
        }
        cache.flush().await;
        assert_eq!(DiskStore::new(dir.path()).entry_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_write_after_clear_lands_after_it() {
        let dir = TempDir::new().unwrap();
        let cache = disk_cache(&dir);

        drop(cache.store(key("old"), Bytes::from_static(b"v"), StoragePolicy::MemoryAndDisk));
        let clearing = cache.clear(StoragePolicy::MemoryAndDisk);
        let writing = cache.store(key("new"), Bytes::from_static(b"w"), StoragePolicy::DiskOnly);

        clearing.wait().await.unwrap();
        writing.wait().await.unwrap();

        assert_eq!(cache.read(&key("old")).await, None);
        assert_eq!(cache.read(&key("new")).await, Some(Bytes::from_static(b"w")));
    }

    #[tokio::test]
    async fn test_clear_memory_only_keeps_disk() {
        let dir = TempDir::new().unwrap();
        let cache = disk_cache(&dir);

        cache
            .store(key("a"), Bytes::from_static(b"v"), StoragePolicy::MemoryAndDisk)
            .wait()
            .await
            .unwrap();
        cache.clear(StoragePolicy::MemoryOnly).wait().await.unwrap();

        assert_eq!(cache.read_memory(&key("a")), None);
        assert_eq!(cache.read(&key("a")).await, Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn test_on_complete_callback() {
        let dir = TempDir::new().unwrap();
        let cache = disk_cache(&dir);
        let (tx, rx) = tokio::sync::oneshot::channel();

        cache
            .store(key("a"), Bytes::from_static(b"v"), StoragePolicy::DiskOnly)
            .on_complete(move |result| {
                let _ = tx.send(result.is_ok());
            });

        assert!(rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_completed_write_calls_back_inline() {
        let cache = TieredCache::memory_only(1024, Handle::current());
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&called);

        cache
            .store(key("a"), Bytes::from_static(b"v"), StoragePolicy::MemoryOnly)
            .on_complete(move |_| flag.store(true, std::sync::atomic::Ordering::SeqCst));

        assert!(called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_handler_outliving_cache_is_noop() {
        let cache = TieredCache::memory_only(1024, Handle::current());
        let callback = cache.memory_pressure_handler().into_callback();
        drop(cache);
        callback();
    }
}
