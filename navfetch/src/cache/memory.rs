//! In-memory cache with LRU eviction under a byte-cost ceiling.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::stats::CacheStats;
use super::types::CacheKey;

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Bytes,
    /// Tick of the last access, for LRU ordering
    last_accessed: u64,
    access_count: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<CacheKey, CacheEntry>,
    size_bytes: usize,
    /// Monotonic access counter; strictly increases on every get/put
    tick: u64,
}

impl MemoryState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.data.len());
        Some(entry)
    }
}

/// Fast, reclaimable tier.
///
/// Thread-safe; callers need no external locking. The whole tier may be
/// dropped at any time by [`purge`](Self::purge), which callers observe only
/// as misses.
pub struct MemoryCache {
    state: Mutex<MemoryState>,
    max_size_bytes: usize,
    stats: Mutex<CacheStats>,
}

impl MemoryCache {
    /// Create a memory cache holding at most `max_size_bytes` of data.
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            max_size_bytes,
            stats: Mutex::new(CacheStats::new()),
        }
    }

    /// Returns the cached bytes and marks the entry most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let mut state = self.state.lock();
        let tick = state.next_tick();

        let data = state.entries.get_mut(key).map(|entry| {
            entry.last_accessed = tick;
            entry.access_count += 1;
            entry.data.clone()
        });
        drop(state);

        let mut stats = self.stats.lock();
        if data.is_some() {
            stats.record_memory_hit();
        } else {
            stats.record_memory_miss();
        }
        data
    }

    /// Insert or replace an entry, evicting least recently used entries
    /// until it fits.
    ///
    /// An entry larger than the ceiling evicts everything else and is kept
    /// on its own.
    pub fn put(&self, key: CacheKey, data: Bytes) {
        let data_size = data.len();
        let mut state = self.state.lock();
        state.remove(&key);

        let evicted = if state.size_bytes + data_size > self.max_size_bytes {
            self.evict_lru(&mut state, data_size)
        } else {
            0
        };

        let tick = state.next_tick();
        state.entries.insert(
            key,
            CacheEntry {
                data,
                last_accessed: tick,
                access_count: 0,
            },
        );
        state.size_bytes += data_size;
        let (size, count) = (state.size_bytes, state.entries.len());
        drop(state);

        let mut stats = self.stats.lock();
        if evicted > 0 {
            stats.record_memory_eviction(evicted);
        }
        stats.update_memory_size(size, count);
    }

    /// Remove one entry. Returns true if it was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock();
        let removed = state.remove(key).is_some();
        let (size, count) = (state.size_bytes, state.entries.len());
        drop(state);

        self.stats.lock().update_memory_size(size, count);
        removed
    }

    /// Check for an entry without touching its LRU position or the stats.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.state.lock().size_bytes
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.size_bytes = 0;
        drop(state);

        self.stats.lock().update_memory_size(0, 0);
    }

    /// Drop the whole tier in response to a low-memory signal.
    pub fn purge(&self) {
        let mut state = self.state.lock();
        let count = state.entries.len();
        let bytes = state.size_bytes;
        state.entries.clear();
        state.size_bytes = 0;
        drop(state);

        let mut stats = self.stats.lock();
        stats.record_memory_purge();
        stats.update_memory_size(0, 0);
        drop(stats);

        info!(
            entries = count,
            bytes = bytes,
            "Memory cache purged on low-memory signal"
        );
    }

    /// Evict oldest entries until `required` more bytes fit, or the tier is
    /// empty. Returns the number of entries evicted.
    fn evict_lru(&self, state: &mut MemoryState, required: usize) -> u64 {
        let target_size = self.max_size_bytes.saturating_sub(required);

        let mut candidates: Vec<(u64, CacheKey)> = state
            .entries
            .iter()
            .map(|(key, entry)| (entry.last_accessed, key.clone()))
            .collect();
        candidates.sort_unstable_by_key(|(tick, _)| *tick);

        let mut evicted = 0;
        for (_, key) in candidates {
            if state.size_bytes <= target_size {
                break;
            }
            state.remove(&key);
            evicted += 1;
        }

        if evicted > 0 {
            debug!(
                evicted = evicted,
                size_bytes = state.size_bytes,
                max_bytes = self.max_size_bytes,
                "Memory cache LRU eviction"
            );
        }
        evicted
    }
}
