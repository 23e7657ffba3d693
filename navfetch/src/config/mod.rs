//! User configuration from `~/.navfetch/config.ini`.
//!
//! ```ini
//! [cache]
//! memory_size = 64MB
//! persist = true
//!
//! [download]
//! timeout = 30
//!
//! [sprite]
//! scale = 2
//! ```
//!
//! Missing keys fall back to the values in [`ConfigFile::default`].

mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::{
    config_directory, config_file_path, default_cache_directory, default_log_file,
    default_max_concurrent, DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_MEMORY_CACHE_SIZE,
    DEFAULT_SPRITE_SCALE, MAX_MAX_CONCURRENT, MAX_SPRITE_SCALE, MIN_MAX_CONCURRENT,
};
pub use file::ConfigFileError;
pub use settings::{CacheSettings, ConfigFile, DownloadSettings, LoggingSettings, SpriteSettings};
pub use size::{format_size, parse_size, Size, SizeParseError};
