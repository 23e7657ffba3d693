//! Settings structs, one per `[section]` of config.ini.

use std::path::PathBuf;

use crate::fetch::CoordinatorConfig;
use crate::transport::RequestPolicy;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub download: DownloadSettings,
    pub sprite: SpriteSettings,
    pub logging: LoggingSettings,
}

/// `[cache]`
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Directory of the persistent tier
    pub directory: PathBuf,
    /// Memory tier ceiling in bytes
    pub memory_size: usize,
    /// Whether fetched resources are also written to disk
    pub persist: bool,
}

/// `[download]` plus the `[headers]` section.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Request timeout in seconds
    pub timeout: u64,
    /// Worker pool size
    pub max_concurrent: usize,
    pub user_agent: String,
    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,
}

impl DownloadSettings {
    pub fn request_policy(&self) -> RequestPolicy {
        self.headers
            .iter()
            .fold(RequestPolicy::new(self.user_agent.clone()), |policy, (name, value)| {
                policy.with_header(name.clone(), value.clone())
            })
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new(self.request_policy(), self.max_concurrent)
    }
}

/// `[sprite]`
#[derive(Debug, Clone)]
pub struct SpriteSettings {
    /// Pixel ratio of the sheets to fetch (1, 2 or 3)
    pub scale: u32,
}

/// `[logging]`
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub file: PathBuf,
}
