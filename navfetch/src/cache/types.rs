//! Core types for the cache system.

use std::fmt;

use thiserror::Error;

/// Key under which cached bytes are stored.
///
/// Distinct from the transport's resource identifier: one URL may be cached
/// under several keys (per scale factor, per style) and the cache never
/// looks at URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key scoped under a namespace, e.g. a style id.
    pub fn scoped(scope: &str, name: &str) -> Self {
        Self(format!("{}/{}", scope, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Which tiers a store or clear touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoragePolicy {
    MemoryOnly,
    DiskOnly,
    #[default]
    MemoryAndDisk,
}

impl StoragePolicy {
    pub fn includes_memory(self) -> bool {
        matches!(self, Self::MemoryOnly | Self::MemoryAndDisk)
    }

    pub fn includes_disk(self) -> bool {
        matches!(self, Self::DiskOnly | Self::MemoryAndDisk)
    }

    /// Policy for a caller that may or may not want persistence.
    pub fn with_disk(to_disk: bool) -> Self {
        if to_disk {
            Self::MemoryAndDisk
        } else {
            Self::MemoryOnly
        }
    }
}

impl fmt::Display for StoragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemoryOnly => write!(f, "memory"),
            Self::DiskOnly => write!(f, "disk"),
            Self::MemoryAndDisk => write!(f, "memory+disk"),
        }
    }
}

/// Cache-related errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error in the persistent tier
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Background write or clear task failed to run to completion
    #[error("Cache task failed: {0}")]
    Task(String),
}
