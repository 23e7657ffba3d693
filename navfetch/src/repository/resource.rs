//! Read-through repository for one resource family.
//!
//! ```text
//! fetch(url, key) ──► pending[key] ──► TieredCache ─hit──────────────┐
//!                          │               │miss                     │
//!                          │               ▼                         ▼
//!                          │        FetchCoordinator ─► decode ─► store ─► completions
//!                          └── later calls for the same key just queue here
//! ```

use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::decoder::ResourceDecoder;
use crate::cache::{CacheError, CacheKey, PendingWrite, StoragePolicy, TieredCache};
use crate::fetch::{FetchCoordinator, FetchError};
use crate::transport::ResourceId;

/// Callback receiving a decoded resource or the reason there is none.
pub type ResourceCompletion<T> = Box<dyn FnOnce(Result<T, FetchError>) + Send + 'static>;

struct RepositoryInner<D: ResourceDecoder> {
    coordinator: Arc<FetchCoordinator>,
    cache: Arc<TieredCache>,
    decoder: D,
    policy: StoragePolicy,
    /// Completions are `Send` but not `Sync`; the mutex keeps the map `Sync`
    pending: DashMap<CacheKey, Mutex<Vec<ResourceCompletion<D::Output>>>>,
    runtime: Handle,
}

/// "Get or fetch" access to resources decoded by `D`, keyed by [`CacheKey`].
///
/// Cheap to clone; clones share state.
pub struct ResourceRepository<D: ResourceDecoder> {
    inner: Arc<RepositoryInner<D>>,
}

impl<D: ResourceDecoder> Clone for ResourceRepository<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: ResourceDecoder> ResourceRepository<D> {
    /// Create a repository writing fetched resources with `policy`.
    pub fn new(
        coordinator: Arc<FetchCoordinator>,
        cache: Arc<TieredCache>,
        decoder: D,
        policy: StoragePolicy,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(RepositoryInner {
                coordinator,
                cache,
                decoder,
                policy,
                pending: DashMap::new(),
                runtime,
            }),
        }
    }

    /// Memory-tier lookup; performs no I/O.
    ///
    /// Decodes the cached bytes on the calling thread.
    pub fn cached(&self, key: &CacheKey) -> Option<D::Output> {
        let bytes = self.inner.cache.read_memory(key)?;
        self.inner.decoder.decode(&bytes)
    }

    /// Read through both cache tiers without touching the network.
    pub async fn read(&self, key: &CacheKey) -> Option<D::Output> {
        let bytes = self.inner.cache.read(key).await?;
        RepositoryInner::decode_blocking(&self.inner, bytes).await
    }

    /// Deliver the resource for `key`, fetching `url` on a cache miss.
    ///
    /// Calls for a key already being resolved join that resolution, so the
    /// cache is written once. Failures and undecodable payloads are reported
    /// to every waiter and never cached.
    pub fn fetch(
        &self,
        url: ResourceId,
        key: CacheKey,
        completion: ResourceCompletion<D::Output>,
    ) {
        match self.inner.pending.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let mut waiters = entry.get().lock();
                waiters.push(completion);
                debug!(key = %key, waiters = waiters.len(), "Joining pending resource");
                return;
            }
            Entry::Vacant(entry) => {
                entry.insert(Mutex::new(vec![completion]));
            }
        }

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let result = inner.resolve(&url, &key).await;
            inner.deliver(&key, result);
        });
    }

    /// Like [`fetch`](Self::fetch) but awaits the outcome.
    pub async fn load(&self, url: ResourceId, key: CacheKey) -> Result<D::Output, FetchError> {
        let (tx, rx) = oneshot::channel();
        self.fetch(
            url,
            key,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await.unwrap_or(Err(FetchError::Cancelled))
    }

    /// Prime the cache with bytes obtained elsewhere.
    ///
    /// The bytes are decoded first; unusable payloads are rejected with
    /// [`FetchError::NoData`] and not stored.
    pub fn store(
        &self,
        key: CacheKey,
        bytes: Bytes,
        policy: StoragePolicy,
    ) -> Result<PendingWrite, FetchError> {
        if self.inner.decoder.decode(&bytes).is_none() {
            warn!(key = %key, decoder = self.inner.decoder.name(), "Refusing to cache undecodable bytes");
            return Err(FetchError::NoData);
        }
        Ok(self.inner.cache.store(key, bytes, policy))
    }

    /// Clear both cache tiers, then invoke `completion`.
    pub fn clear_all<F>(&self, completion: F)
    where
        F: FnOnce(Result<(), CacheError>) + Send + 'static,
    {
        self.inner
            .cache
            .clear(StoragePolicy::MemoryAndDisk)
            .on_complete(completion);
    }

    /// Keys currently being resolved.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.inner.cache
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.inner.coordinator
    }
}

impl<D: ResourceDecoder> RepositoryInner<D> {
    async fn resolve(self: &Arc<Self>, url: &ResourceId, key: &CacheKey) -> Result<D::Output, FetchError> {
        if let Some(bytes) = self.cache.read(key).await {
            match Self::decode_blocking(self, bytes).await {
                Some(value) => {
                    debug!(key = %key, "Resource served from cache");
                    return Ok(value);
                }
                None => warn!(key = %key, "Cached bytes no longer decode, refetching"),
            }
        }

        let bytes = self.coordinator.fetch_async(url.clone()).await?;

        let value = Self::decode_blocking(self, bytes.clone()).await.ok_or_else(|| {
            warn!(
                url = %url,
                key = %key,
                decoder = self.decoder.name(),
                "Fetched payload could not be decoded"
            );
            FetchError::NoData
        })?;

        // Memory is written synchronously; the disk write completes on its own
        let pending = self.cache.store(key.clone(), bytes, self.policy);
        let log_key = key.clone();
        pending.on_complete(move |result| {
            if let Err(e) = result {
                warn!(key = %log_key, error = %e, "Resource cached in memory only");
            }
        });

        Ok(value)
    }

    async fn decode_blocking(self: &Arc<Self>, bytes: Bytes) -> Option<D::Output> {
        let inner = Arc::clone(self);
        match tokio::task::spawn_blocking(move || inner.decoder.decode(&bytes)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Decode task failed");
                None
            }
        }
    }

    fn deliver(&self, key: &CacheKey, result: Result<D::Output, FetchError>) {
        let Some((_, completions)) = self.pending.remove(key) else {
            return;
        };
        for completion in completions.into_inner() {
            completion(result.clone());
        }
    }
}
