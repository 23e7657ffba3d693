//! Sprite sheet repository with atomic generation swaps.
//!
//! ```text
//!             update_style(G)
//!   Idle ──────────────────────► Fetching ──both ok──► Ready
//!                                   │  ▲                 │
//!                                   │  └─ update_style ──┘
//!                                   └──either fails──► Failed
//! ```
//!
//! A generation's sheet and metadata are installed together as one
//! [`InstalledSprite`], so readers never see a sheet from one generation with
//! metadata from another. When a fetch fails, the previously installed
//! generation keeps being served.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::generation::{Generation, GenerationPhase};
use super::metadata::SpriteMetadata;
use super::shield::ShieldKey;
use crate::cache::{CacheError, CacheKey};
use crate::fetch::FetchError;
use crate::repository::{DecodedImage, ImageRepository, JsonDecoder, ResourceCompletion, ResourceRepository};
use crate::transport::ResourceId;

/// Repository of sprite metadata documents.
pub type SpriteMetadataRepository = ResourceRepository<JsonDecoder<SpriteMetadata>>;

/// Callback receiving the outcome of a style update.
pub type SpriteCompletion = Box<dyn FnOnce(Result<(), SpriteError>) + Send + 'static>;

/// Why a generation was not installed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpriteError {
    #[error("sprite sheet unavailable: {0}")]
    Image(FetchError),

    #[error("sprite metadata unavailable: {0}")]
    Metadata(FetchError),

    /// A newer update started before this one finished
    #[error("style update superseded by a newer one")]
    Superseded,
}

/// A sheet and its metadata from one generation.
pub struct InstalledSprite {
    generation: Generation,
    sheet: Arc<RgbaImage>,
    metadata: Arc<SpriteMetadata>,
    /// Cropped sprites by name
    crops: Mutex<HashMap<String, Arc<RgbaImage>>>,
}

impl InstalledSprite {
    fn new(generation: Generation, sheet: RgbaImage, metadata: SpriteMetadata) -> Self {
        Self {
            generation,
            sheet: Arc::new(sheet),
            metadata: Arc::new(metadata),
            crops: Mutex::new(HashMap::new()),
        }
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn sheet(&self) -> &Arc<RgbaImage> {
        &self.sheet
    }

    pub fn metadata(&self) -> &Arc<SpriteMetadata> {
        &self.metadata
    }

    /// Crop the named sprite out of the sheet.
    ///
    /// `None` if the name is unknown or its rectangle lies outside the sheet.
    pub fn sprite(&self, name: &str) -> Option<Arc<RgbaImage>> {
        if let Some(crop) = self.crops.lock().get(name) {
            return Some(Arc::clone(crop));
        }

        let info = self.metadata.get(name)?;
        if !info.fits_within(self.sheet.width(), self.sheet.height()) {
            return None;
        }

        let crop = Arc::new(
            image::imageops::crop_imm(&*self.sheet, info.x, info.y, info.width, info.height)
                .to_image(),
        );
        self.crops
            .lock()
            .insert(name.to_string(), Arc::clone(&crop));
        Some(crop)
    }

    fn clear_crops(&self) {
        self.crops.lock().clear();
    }
}

#[derive(Default)]
struct SpriteState {
    phase: GenerationPhase,
    requested: Option<Generation>,
    installed: Option<Arc<InstalledSprite>>,
}

struct SpriteInner {
    images: ImageRepository,
    metadata: SpriteMetadataRepository,
    scale: u32,
    state: RwLock<SpriteState>,
    /// Bumped under the state write lock on every update or reset
    epoch: AtomicU64,
    runtime: Handle,
}

/// Road shields and icons from style sprite sheets.
#[derive(Clone)]
pub struct SpriteRepository {
    inner: Arc<SpriteInner>,
}

impl SpriteRepository {
    /// Create a repository fetching `sprite@{scale}x` assets.
    pub fn new(
        images: ImageRepository,
        metadata: SpriteMetadataRepository,
        scale: u32,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(SpriteInner {
                images,
                metadata,
                scale: scale.max(1),
                state: RwLock::new(SpriteState::default()),
                epoch: AtomicU64::new(0),
                runtime,
            }),
        }
    }

    pub fn scale(&self) -> u32 {
        self.inner.scale
    }

    /// Phase of the most recent update.
    pub fn phase(&self) -> GenerationPhase {
        self.inner.state.read().phase
    }

    /// Generation most recently asked for.
    pub fn requested_generation(&self) -> Option<Generation> {
        self.inner.state.read().requested.clone()
    }

    /// Generation currently served, if any ever succeeded.
    pub fn installed_generation(&self) -> Option<Generation> {
        self.installed().map(|installed| installed.generation.clone())
    }

    /// The installed sheet and metadata as one unit.
    pub fn installed(&self) -> Option<Arc<InstalledSprite>> {
        self.inner.state.read().installed.clone()
    }

    /// Switch to `generation`, fetching its sheet and metadata concurrently.
    ///
    /// Completes immediately if `generation` is already installed and ready.
    pub fn update_style(&self, generation: Generation, completion: SpriteCompletion) {
        let epoch = {
            let mut state = self.inner.state.write();
            let already_ready = state.phase == GenerationPhase::Ready
                && state
                    .installed
                    .as_ref()
                    .is_some_and(|installed| installed.generation == generation);
            if already_ready {
                drop(state);
                debug!(generation = %generation, "Sprite generation already installed");
                completion(Ok(()));
                return;
            }

            state.phase = GenerationPhase::Fetching;
            state.requested = Some(generation.clone());
            if let Some(installed) = &state.installed {
                installed.clear_crops();
            }
            self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };

        info!(generation = %generation, scale = self.inner.scale, "Fetching sprite generation");

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let result = inner.fetch_generation(&generation).await;
            completion(inner.finish_generation(epoch, result));
        });
    }

    /// Like [`update_style`](Self::update_style) but awaits the outcome.
    pub async fn update_style_async(&self, generation: Generation) -> Result<(), SpriteError> {
        let (tx, rx) = oneshot::channel();
        self.update_style(
            generation,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await.unwrap_or(Err(SpriteError::Superseded))
    }

    /// Crop of the named sprite from the installed generation.
    ///
    /// Pure lookup over in-memory state; never blocks on I/O.
    pub fn sprite(&self, name: &str) -> Option<Arc<RgbaImage>> {
        self.installed()?.sprite(name)
    }

    /// Shield for `key` from the installed generation.
    ///
    /// Falls back to narrower width variants when the preferred one is
    /// missing.
    pub fn shield(&self, key: &ShieldKey) -> Option<Arc<RgbaImage>> {
        let installed = self.installed()?;
        key.candidates().find_map(|name| installed.sprite(&name))
    }

    fn legacy_shield_url(&self, base_url: &str) -> String {
        format!("{}@{}x.png", base_url.trim_end_matches('/'), self.inner.scale)
    }

    /// Fetch a single-image shield published at `{base_url}@{scale}x.png`.
    pub fn legacy_shield(&self, base_url: &str, completion: ResourceCompletion<DecodedImage>) {
        let url = self.legacy_shield_url(base_url);
        let key = CacheKey::new(url.as_str());
        self.inner.images.fetch(ResourceId::new(url), key, completion);
    }

    /// Cached legacy shield, if the memory tier still has it.
    pub fn cached_legacy_shield(&self, base_url: &str) -> Option<DecodedImage> {
        let key = CacheKey::new(self.legacy_shield_url(base_url));
        self.inner.images.cached(&key)
    }

    /// Forget the installed generation and clear both cache tiers.
    ///
    /// Any update still in flight is treated as superseded.
    pub fn reset_cache<F>(&self, completion: F)
    where
        F: FnOnce(Result<(), CacheError>) + Send + 'static,
    {
        {
            let mut state = self.inner.state.write();
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            *state = SpriteState::default();
        }
        info!("Sprite cache reset");
        // Sheets, metadata and legacy shields share one cache
        self.inner.images.clear_all(completion);
    }
}

impl SpriteInner {
    async fn fetch_generation(&self, generation: &Generation) -> Result<InstalledSprite, SpriteError> {
        let scale = self.scale;
        let (image, metadata) = futures::join!(
            self.images
                .load(generation.image_url(scale), generation.image_key(scale)),
            self.metadata
                .load(generation.metadata_url(scale), generation.metadata_key(scale)),
        );
        let image = image.map_err(SpriteError::Image)?;
        let metadata = metadata.map_err(SpriteError::Metadata)?;

        let decoded = Arc::clone(&image.image);
        let sheet = tokio::task::spawn_blocking(move || decoded.to_rgba8())
            .await
            .map_err(|e| {
                warn!(error = %e, "Sprite sheet conversion failed");
                SpriteError::Image(FetchError::NoData)
            })?;

        let out_of_bounds = metadata.out_of_bounds(sheet.width(), sheet.height());
        if !out_of_bounds.is_empty() {
            warn!(
                generation = %generation,
                count = out_of_bounds.len(),
                "Sprite metadata references regions outside the sheet"
            );
        }

        Ok(InstalledSprite::new(generation.clone(), sheet, metadata))
    }

    fn finish_generation(
        &self,
        epoch: u64,
        result: Result<InstalledSprite, SpriteError>,
    ) -> Result<(), SpriteError> {
        let mut state = self.state.write();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(epoch = epoch, "Discarding superseded sprite generation");
            return Err(SpriteError::Superseded);
        }

        match result {
            Ok(installed) => {
                info!(
                    generation = %installed.generation,
                    sprites = installed.metadata.len(),
                    width = installed.sheet.width(),
                    height = installed.sheet.height(),
                    "Sprite generation installed"
                );
                state.installed = Some(Arc::new(installed));
                state.phase = GenerationPhase::Ready;
                Ok(())
            }
            Err(e) => {
                warn!(
                    error = %e,
                    serving_previous = state.installed.is_some(),
                    "Sprite generation failed"
                );
                state.phase = GenerationPhase::Failed;
                Err(e)
            }
        }
    }
}
