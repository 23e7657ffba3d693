//! Sprite generations and their lifecycle.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::cache::CacheKey;
use crate::transport::ResourceId;

/// One versioned sprite sheet: a style id plus the base URL its assets live
/// under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Generation {
    pub style_id: String,
    pub base_url: String,
}

impl Generation {
    pub fn new(style_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            style_id: style_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn file_name(scale: u32, extension: &str) -> String {
        format!("sprite@{}x.{}", scale, extension)
    }

    /// `{base_url}/sprite@{scale}x.png`
    pub fn image_url(&self, scale: u32) -> ResourceId {
        ResourceId::new(format!("{}/{}", self.base_url, Self::file_name(scale, "png")))
    }

    /// `{base_url}/sprite@{scale}x.json`
    pub fn metadata_url(&self, scale: u32) -> ResourceId {
        ResourceId::new(format!("{}/{}", self.base_url, Self::file_name(scale, "json")))
    }

    /// Cache scope covering both halves of the generation.
    ///
    /// `{style_id}/{sha256(base_url)}`, so the same style at another base URL
    /// never shares entries with this one.
    fn cache_scope(&self) -> String {
        let digest = Sha256::digest(self.base_url.as_bytes());
        format!("{}/{}", self.style_id, hex::encode(digest))
    }

    pub fn image_key(&self, scale: u32) -> CacheKey {
        CacheKey::scoped(&self.cache_scope(), &Self::file_name(scale, "png"))
    }

    pub fn metadata_key(&self, scale: u32) -> CacheKey {
        CacheKey::scoped(&self.cache_scope(), &Self::file_name(scale, "json"))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.style_id, self.base_url)
    }
}

/// Where the most recently requested generation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationPhase {
    /// Nothing requested yet
    #[default]
    Idle,
    /// Sheet and metadata are being fetched
    Fetching,
    /// Both assets installed
    Ready,
    /// A sub-fetch failed; the previous generation, if any, is still served
    Failed,
}

impl fmt::Display for GenerationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetching => write!(f, "fetching"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
