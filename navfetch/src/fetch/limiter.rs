//! Bounded worker pool for fetch operations.
//!
//! Each operation holds one permit from the moment its transfer starts until
//! it finishes, so at most `max_concurrent` transfers are in flight at once.
//!
//! The default limit scales with the host:
//! ```text
//! min(num_cpus * scaling_factor, ceiling)
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Default multiplier for the CPU count.
pub const DEFAULT_SCALING_FACTOR: usize = 4;

/// Default cap on concurrent transfers.
pub const DEFAULT_CEILING: usize = 32;

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Counters {
    fn enter(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        let mut peak = self.peak_in_flight.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_in_flight.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }
}

/// Semaphore-backed limiter for concurrent transfers.
#[derive(Debug)]
pub struct FetchLimiter {
    semaphore: Arc<Semaphore>,
    max_permits: usize,
    counters: Arc<Counters>,
}

impl FetchLimiter {
    /// Creates a limiter allowing `max_concurrent` transfers.
    ///
    /// A value of 0 is raised to 1.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_permits: max_concurrent,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Creates a limiter sized `min(num_cpus * 4, 32)`.
    pub fn with_defaults() -> Self {
        Self::with_scaling(DEFAULT_SCALING_FACTOR, DEFAULT_CEILING)
    }

    pub fn with_scaling(scaling_factor: usize, ceiling: usize) -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);
        Self::new((cpus * scaling_factor).min(ceiling))
    }

    /// Wait for a free slot.
    ///
    /// The returned permit is owned so it can travel with a spawned task.
    pub async fn acquire(&self) -> Result<FetchPermit, AcquireError> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
        self.counters.enter();
        Ok(FetchPermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<FetchPermit> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        self.counters.enter();
        Some(FetchPermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_permits
    }

    /// Transfers currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Relaxed)
    }

    /// Highest concurrency observed since creation or the last reset.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::Relaxed)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn reset_peak(&self) {
        self.counters.peak_in_flight.store(0, Ordering::Relaxed);
    }
}

impl Default for FetchLimiter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Slot in the worker pool, released on drop.
#[derive(Debug)]
pub struct FetchPermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for FetchPermit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
