//! INI serialization: `ConfigFile` → commented INI string.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::format_size;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let headers: String = config
        .download
        .headers
        .iter()
        .map(|(name, value)| format!("{} = {}\n", name, value))
        .collect();

    format!(
        r#"[cache]
; Directory for the persistent tier. One file per resource, named by SHA-256 of its key.
; Defaults to the platform cache directory (~/.cache/navfetch on Linux)
directory = {}
; Memory tier ceiling (default: 64MB). Least recently used entries are evicted first.
; Supports: KB, MB, GB suffixes (e.g., 512KB, 64MB, 1GB)
memory_size = {}
; Write fetched resources to disk as well as memory (default: true)
persist = {}

[download]
; Request timeout in seconds (default: 30)
timeout = {}
; Maximum concurrent transfers (default: min(cpus * 4, 32), range 1-128)
max_concurrent = {}
; User-Agent sent with every request
user_agent = {}

[headers]
; Extra headers sent with every request, one per line:
; Accept-Language = en-US
{}
[sprite]
; Sprite sheet pixel ratio: 1, 2 or 3 (default: 2)
scale = {}

[logging]
; Log file, truncated at startup
file = {}
"#,
        path_to_string(&config.cache.directory),
        format_size(config.cache.memory_size),
        config.cache.persist,
        config.download.timeout,
        config.download.max_concurrent,
        config.download.user_agent,
        headers,
        config.sprite.scale,
        path_to_string(&config.logging.file),
    )
}

/// Render a path with the home directory shown as `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::super::settings::ConfigFile;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_written_config_loads_back() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.cache.directory = temp_dir.path().join("cache");
        config.cache.memory_size = 8 * 1024 * 1024;
        config.cache.persist = false;
        config.download.timeout = 12;
        config.download.max_concurrent = 6;
        config.download.headers = vec![("Accept-Language".to_string(), "fr".to_string())];
        config.sprite.scale = 1;
        config.save_to(&config_path).unwrap();

        let loaded = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(loaded.cache.directory, config.cache.directory);
        assert_eq!(loaded.cache.memory_size, 8 * 1024 * 1024);
        assert!(!loaded.cache.persist);
        assert_eq!(loaded.download.timeout, 12);
        assert_eq!(loaded.download.max_concurrent, 6);
        assert_eq!(loaded.download.headers, config.download.headers);
        assert_eq!(loaded.sprite.scale, 1);
    }

    #[test]
    fn test_output_is_commented() {
        let content = to_config_string(&ConfigFile::default());
        assert!(content.contains("; Memory tier ceiling"));
        assert!(content.contains("memory_size = 64MB"));
        assert!(content.contains("[headers]"));
    }

    #[test]
    fn test_path_to_string_uses_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path_to_string(&home.join("x/y")), "~/x/y");
        }
        assert_eq!(path_to_string(Path::new("/opt/cache")), "/opt/cache");
    }
}
