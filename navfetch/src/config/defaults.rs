//! Default values and constants for configuration settings.

use std::path::PathBuf;

use super::settings::*;
use crate::transport::DEFAULT_USER_AGENT;

/// Memory tier ceiling.
pub const DEFAULT_MEMORY_CACHE_SIZE: usize = 64 * 1024 * 1024;

/// HTTP request timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Bounds for `download.max_concurrent`.
pub const MIN_MAX_CONCURRENT: usize = 1;
pub const MAX_MAX_CONCURRENT: usize = 128;

/// Sprite sheets are published for these pixel ratios.
pub const DEFAULT_SPRITE_SCALE: u32 = 2;
pub const MAX_SPRITE_SCALE: u32 = 3;

/// Concurrent transfers: `min(num_cpus * 4, 32)`.
pub fn default_max_concurrent() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cpus * 4).min(32)
}

/// Clamp `download.max_concurrent` into range, warning when it changes.
pub(super) fn clamp_max_concurrent(value: usize) -> usize {
    let clamped = value.clamp(MIN_MAX_CONCURRENT, MAX_MAX_CONCURRENT);
    if clamped != value {
        tracing::warn!(
            requested = value,
            min = MIN_MAX_CONCURRENT,
            max = MAX_MAX_CONCURRENT,
            "max_concurrent out of range, clamping to {}",
            clamped
        );
    }
    clamped
}

/// `~/.navfetch`
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".navfetch")
}

/// `~/.navfetch/config.ini`
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// Platform cache directory, falling back to `~/.navfetch/cache`.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("navfetch"))
        .unwrap_or_else(|| config_directory().join("cache"))
}

/// `~/.navfetch/navfetch.log`
pub fn default_log_file() -> PathBuf {
    config_directory().join("navfetch.log")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            cache: CacheSettings {
                directory: default_cache_directory(),
                memory_size: DEFAULT_MEMORY_CACHE_SIZE,
                persist: true,
            },
            download: DownloadSettings {
                timeout: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
                max_concurrent: default_max_concurrent(),
                user_agent: DEFAULT_USER_AGENT.to_string(),
                headers: Vec::new(),
            },
            sprite: SpriteSettings {
                scale: DEFAULT_SPRITE_SCALE,
            },
            logging: LoggingSettings {
                file: default_log_file(),
            },
        }
    }
}
