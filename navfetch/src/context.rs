//! Explicitly constructed owner of the fetch and cache stack.
//!
//! One [`AssetContext`] holds the coordinator, the cache and the
//! repositories built on them. Build it once and pass it (or clones of its
//! parts) to whatever needs resources.
//!
//! ```ignore
//! let config = ConfigFile::load()?;
//! let context = AssetContext::builder(config).build()?;
//! let icon = context.images().load(url, key).await?;
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::info;

use crate::cache::{DiskStore, PersistentStore, StoragePolicy, TieredCache};
use crate::config::ConfigFile;
use crate::fetch::FetchCoordinator;
use crate::repository::{
    ImageDecoder, ImageRepository, JsonDecoder, ResourceDecoder, ResourceRepository,
};
use crate::sprite::{SpriteMetadataRepository, SpriteRepository};
use crate::transport::{ReqwestTransport, Transport, TransportError};

/// Errors building an [`AssetContext`].
#[derive(Debug, Error)]
pub enum ContextError {
    /// No runtime handle was given and none is current
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// Persistent tier directory could not be prepared
    #[error("cache directory {path} unusable: {source}")]
    CacheDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP client could not be constructed
    #[error("failed to build transport: {0}")]
    Transport(#[from] TransportError),
}

/// Builder for [`AssetContext`].
///
/// Anything not injected is created from the [`ConfigFile`].
pub struct AssetContextBuilder {
    config: ConfigFile,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn PersistentStore>>,
    runtime: Option<Handle>,
}

impl AssetContextBuilder {
    /// Use this transport instead of a [`ReqwestTransport`].
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use this persistent tier instead of a [`DiskStore`] in `cache.directory`.
    pub fn with_store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Spawn work on this runtime instead of the current one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<AssetContext, ContextError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()?,
        };
        let config = self.config;

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let _enter = runtime.enter();
                Arc::new(ReqwestTransport::with_timeout(config.download.timeout)?)
            }
        };

        let store: Option<Arc<dyn PersistentStore>> = match self.store {
            Some(store) => Some(store),
            None if config.cache.persist => {
                let directory = &config.cache.directory;
                std::fs::create_dir_all(directory).map_err(|source| {
                    ContextError::CacheDirectory {
                        path: directory.display().to_string(),
                        source,
                    }
                })?;
                Some(Arc::new(DiskStore::new(directory.clone())))
            }
            None => None,
        };

        let (cache, policy) = match store {
            Some(store) => (
                TieredCache::new(config.cache.memory_size, store, runtime.clone()),
                StoragePolicy::MemoryAndDisk,
            ),
            None => (
                TieredCache::memory_only(config.cache.memory_size, runtime.clone()),
                StoragePolicy::MemoryOnly,
            ),
        };
        let cache = Arc::new(cache);

        let coordinator = FetchCoordinator::new(
            transport,
            config.download.coordinator_config(),
            runtime.clone(),
        );

        let images = ResourceRepository::new(
            Arc::clone(&coordinator),
            Arc::clone(&cache),
            ImageDecoder,
            policy,
            runtime.clone(),
        );
        let sprite_metadata: SpriteMetadataRepository = ResourceRepository::new(
            Arc::clone(&coordinator),
            Arc::clone(&cache),
            JsonDecoder::new(),
            policy,
            runtime.clone(),
        );
        let sprites = SpriteRepository::new(
            images.clone(),
            sprite_metadata,
            config.sprite.scale,
            runtime.clone(),
        );

        info!(
            memory_size = config.cache.memory_size,
            storage = %policy,
            max_concurrent = config.download.max_concurrent,
            sprite_scale = config.sprite.scale,
            "Asset context ready"
        );

        Ok(AssetContext {
            config,
            policy,
            runtime,
            coordinator,
            cache,
            images,
            sprites,
        })
    }
}

/// The coordinator, cache and repositories for one process or test.
#[derive(Clone)]
pub struct AssetContext {
    config: ConfigFile,
    policy: StoragePolicy,
    runtime: Handle,
    coordinator: Arc<FetchCoordinator>,
    cache: Arc<TieredCache>,
    images: ImageRepository,
    sprites: SpriteRepository,
}

impl AssetContext {
    pub fn builder(config: ConfigFile) -> AssetContextBuilder {
        AssetContextBuilder {
            config,
            transport: None,
            store: None,
            runtime: None,
        }
    }

    /// Context from config with a real transport on the current runtime.
    pub fn from_config(config: ConfigFile) -> Result<Self, ContextError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Where fetched resources are written: memory, plus disk when persisting.
    pub fn storage_policy(&self) -> StoragePolicy {
        self.policy
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn images(&self) -> &ImageRepository {
        &self.images
    }

    pub fn sprites(&self) -> &SpriteRepository {
        &self.sprites
    }

    /// Repository for another resource family on the shared coordinator and cache.
    pub fn repository<D: ResourceDecoder>(&self, decoder: D) -> ResourceRepository<D> {
        ResourceRepository::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.cache),
            decoder,
            self.policy,
            self.runtime.clone(),
        )
    }

    /// Cancel in-flight transfers, wait for pending disk writes and log
    /// statistics.
    pub async fn shutdown(&self) {
        self.coordinator.cancel_all();
        self.cache.flush().await;
        self.coordinator.log_stats();
        self.cache.log_stats();
    }
}
