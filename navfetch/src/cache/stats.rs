//! Cache statistics tracking and reporting.

use std::time::Instant;

/// Counters for both cache tiers.
#[derive(Debug, Clone)]
pub struct CacheStats {
    // Memory tier
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub memory_size_bytes: usize,
    pub memory_entry_count: usize,
    pub memory_evictions: u64,
    pub memory_purges: u64,

    // Persistent tier
    pub disk_hits: u64,
    pub disk_misses: u64,
    pub disk_read_failures: u64,
    pub disk_writes: u64,
    pub disk_write_failures: u64,

    pub created_at: Instant,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            memory_hits: 0,
            memory_misses: 0,
            memory_size_bytes: 0,
            memory_entry_count: 0,
            memory_evictions: 0,
            memory_purges: 0,
            disk_hits: 0,
            disk_misses: 0,
            disk_read_failures: 0,
            disk_writes: 0,
            disk_write_failures: 0,
            created_at: Instant::now(),
        }
    }

    /// Memory tier hit rate (0.0 to 1.0).
    pub fn memory_hit_rate(&self) -> f64 {
        ratio(self.memory_hits, self.memory_hits + self.memory_misses)
    }

    /// Persistent tier hit rate (0.0 to 1.0).
    pub fn disk_hit_rate(&self) -> f64 {
        ratio(self.disk_hits, self.disk_hits + self.disk_misses)
    }

    /// Share of reads served by either tier.
    ///
    /// A memory miss that hits disk counts once, as a hit.
    pub fn overall_hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.disk_hits;
        ratio(hits, hits + self.disk_misses)
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub fn record_memory_hit(&mut self) {
        self.memory_hits += 1;
    }

    pub fn record_memory_miss(&mut self) {
        self.memory_misses += 1;
    }

    pub fn record_memory_eviction(&mut self, count: u64) {
        self.memory_evictions += count;
    }

    pub fn record_memory_purge(&mut self) {
        self.memory_purges += 1;
    }

    pub fn update_memory_size(&mut self, size_bytes: usize, entry_count: usize) {
        self.memory_size_bytes = size_bytes;
        self.memory_entry_count = entry_count;
    }

    pub fn record_disk_hit(&mut self) {
        self.disk_hits += 1;
    }

    pub fn record_disk_miss(&mut self) {
        self.disk_misses += 1;
    }

    pub fn record_disk_read_failure(&mut self) {
        self.disk_read_failures += 1;
    }

    pub fn record_disk_write(&mut self) {
        self.disk_writes += 1;
    }

    pub fn record_disk_write_failure(&mut self) {
        self.disk_write_failures += 1;
    }

    /// Copy the persistent-tier counters from `other`.
    pub(crate) fn merge_disk(&mut self, other: &CacheStats) {
        self.disk_hits = other.disk_hits;
        self.disk_misses = other.disk_misses;
        self.disk_read_failures = other.disk_read_failures;
        self.disk_writes = other.disk_writes;
        self.disk_write_failures = other.disk_write_failures;
        self.created_at = self.created_at.min(other.created_at);
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
