//! Human-readable sizes for the config file ("64MB", "512KB").

use std::fmt;
use thiserror::Error;

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// Suffixes checked longest first so "MB" wins over "B".
const SUFFIXES: &[(&str, usize)] = &[
    ("GB", GB),
    ("MB", MB),
    ("KB", KB),
    ("G", GB),
    ("M", MB),
    ("K", KB),
    ("B", 1),
];

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{input}' - expected format like '64MB', '512KB' or '1GB'")]
pub struct SizeParseError {
    input: String,
}

/// Parse a size such as `"64MB"` into bytes.
///
/// Bare numbers are bytes. Suffixes are binary (1KB = 1024) and
/// case-insensitive; whitespace between number and suffix is allowed.
///
/// ```
/// use navfetch::config::parse_size;
///
/// assert_eq!(parse_size("512").unwrap(), 512);
/// assert_eq!(parse_size("64MB").unwrap(), 64 * 1024 * 1024);
/// assert_eq!(parse_size("2 k").unwrap(), 2048);
/// ```
pub fn parse_size(s: &str) -> Result<usize, SizeParseError> {
    let error = || SizeParseError {
        input: s.to_string(),
    };

    let trimmed = s.trim();
    let upper = trimmed.to_ascii_uppercase();
    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, multiplier)| {
            upper
                .strip_suffix(suffix)
                .map(|rest| (rest.trim_end(), *multiplier))
        })
        .unwrap_or((upper.as_str(), 1));

    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(error());
    }

    number
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(error)
}

/// Format bytes using the largest unit that divides them exactly.
///
/// ```
/// use navfetch::config::format_size;
///
/// assert_eq!(format_size(64 * 1024 * 1024), "64MB");
/// assert_eq!(format_size(1000), "1000");
/// ```
pub fn format_size(bytes: usize) -> String {
    for (suffix, unit) in [("GB", GB), ("MB", MB), ("KB", KB)] {
        if bytes >= unit && bytes % unit == 0 {
            return format!("{}{}", bytes / unit, suffix);
        }
    }
    bytes.to_string()
}

/// A byte count that parses from and displays as a human-readable size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size(pub usize);

impl Size {
    pub fn bytes(self) -> usize {
        self.0
    }

    pub fn from_mb(mb: usize) -> Self {
        Self(mb * MB)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_size(self.0))
    }
}

impl std::str::FromStr for Size {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s).map(Size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_number() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("4096B").unwrap(), 4096);
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_size("1KB").unwrap(), KB);
        assert_eq!(parse_size("1k").unwrap(), KB);
        assert_eq!(parse_size("64MB").unwrap(), 64 * MB);
        assert_eq!(parse_size("64m").unwrap(), 64 * MB);
        assert_eq!(parse_size("2GB").unwrap(), 2 * GB);
    }

    #[test]
    fn test_parse_whitespace() {
        assert_eq!(parse_size("  16MB ").unwrap(), 16 * MB);
        assert_eq!(parse_size("16 MB").unwrap(), 16 * MB);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_size("").is_err());
        assert!(parse_size("MB").is_err());
        assert!(parse_size("lots").is_err());
        assert!(parse_size("1TB").is_err());
        assert!(parse_size("-1MB").is_err());
        assert!(parse_size("1.5MB").is_err());
    }

    #[test]
    fn test_parse_overflow() {
        let huge = format!("{}GB", usize::MAX);
        assert!(parse_size(&huge).is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(KB), "1KB");
        assert_eq!(format_size(64 * MB), "64MB");
        assert_eq!(format_size(GB), "1GB");
        assert_eq!(format_size(1536), "1536");
    }

    #[test]
    fn test_size_display_parses_back() {
        for s in ["512KB", "64MB", "1GB"] {
            let size: Size = s.parse().unwrap();
            assert_eq!(size.to_string(), s);
        }
        assert_eq!(Size::from_mb(3).bytes(), 3 * MB);
    }
}
