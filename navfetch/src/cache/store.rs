//! Persistent storage boundary.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use super::types::{CacheError, CacheKey};

/// Boxed future returned by [`PersistentStore`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key → bytes store that survives process restarts.
///
/// Implementations may be backed by a filesystem, an embedded key-value
/// store or anything else with `put`, `get` and `delete_all`.
pub trait PersistentStore: Send + Sync {
    fn put(&self, key: &CacheKey, data: Bytes) -> BoxFuture<'_, Result<(), CacheError>>;

    /// `Ok(None)` when the key is absent.
    fn get(&self, key: &CacheKey) -> BoxFuture<'_, Result<Option<Bytes>, CacheError>>;

    /// Remove every entry. Returns the number removed.
    fn delete_all(&self) -> BoxFuture<'_, Result<usize, CacheError>>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Store that keeps nothing; every read misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPersistence;

impl PersistentStore for NoPersistence {
    fn put(&self, _key: &CacheKey, _data: Bytes) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async { Ok(()) })
    }

    fn get(&self, _key: &CacheKey) -> BoxFuture<'_, Result<Option<Bytes>, CacheError>> {
        Box::pin(async { Ok(None) })
    }

    fn delete_all(&self) -> BoxFuture<'_, Result<usize, CacheError>> {
        Box::pin(async { Ok(0) })
    }

    fn name(&self) -> &str {
        "none"
    }
}
