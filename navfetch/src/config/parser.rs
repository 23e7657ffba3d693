//! INI parsing: `Ini` → `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;

use super::defaults::{clamp_max_concurrent, MAX_SPRITE_SCALE};
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.cache.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("memory_size") {
            config.cache.memory_size = parse_size(v).map_err(|_| {
                ConfigFileError::invalid(
                    "cache",
                    "memory_size",
                    v,
                    "expected format like '64MB', '512KB' or '1GB'",
                )
            })?;
        }
        if let Some(v) = section.get("persist") {
            config.cache.persist = parse_bool(v);
        }
    }

    // [download] section
    if let Some(section) = ini.section(Some("download")) {
        if let Some(v) = section.get("timeout") {
            config.download.timeout = match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigFileError::invalid(
                        "download",
                        "timeout",
                        v,
                        "must be a positive integer (seconds)",
                    ))
                }
            };
        }
        if let Some(v) = section.get("max_concurrent") {
            let value: usize = v.trim().parse().map_err(|_| {
                ConfigFileError::invalid(
                    "download",
                    "max_concurrent",
                    v,
                    "must be a positive integer",
                )
            })?;
            config.download.max_concurrent = clamp_max_concurrent(value);
        }
        if let Some(v) = section.get("user_agent") {
            let v = v.trim();
            if !v.is_empty() {
                config.download.user_agent = v.to_string();
            }
        }
    }

    // [headers] section: every key is sent verbatim
    if let Some(section) = ini.section(Some("headers")) {
        for (name, value) in section.iter() {
            let name = name.trim();
            if name.is_empty() || name.eq_ignore_ascii_case("user-agent") {
                return Err(ConfigFileError::invalid(
                    "headers",
                    name,
                    value,
                    "set the User-Agent with download.user_agent",
                ));
            }
            config
                .download
                .headers
                .push((name.to_string(), value.trim().to_string()));
        }
    }

    // [sprite] section
    if let Some(section) = ini.section(Some("sprite")) {
        if let Some(v) = section.get("scale") {
            config.sprite.scale = match v.trim().parse::<u32>() {
                Ok(scale) if (1..=MAX_SPRITE_SCALE).contains(&scale) => scale,
                _ => {
                    return Err(ConfigFileError::invalid(
                        "sprite",
                        "scale",
                        v,
                        "must be 1, 2 or 3",
                    ))
                }
            };
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

/// Parse a boolean value from a config string.
/// Accepts: true/false, yes/no, 1/0, on/off (case-insensitive)
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
