//! Utility functions and helpers for record-export
//!
//! - Random identifiers for records and artifact file names
//! - Retention duration parsing and display
//! - Path and byte size helpers for the CLI

use std::path::PathBuf;
use std::time::Duration;

/// Characters used for generated identifiers
const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random `[a-z0-9]` string of the given length
///
/// # Arguments
/// * `len` - Number of characters
///
/// # Returns
/// * `String` - Random identifier
pub fn random_string(len: usize) -> String {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Retention window helpers
pub mod time {
    use super::*;

    /// Units accepted by [`parse_duration`], largest first
    const UNITS: [(char, u64); 4] = [('d', 86_400), ('h', 3600), ('m', 60), ('s', 1)];

    /// Render a duration compactly, e.g. `1h 30m 45s`; sub-second values as `ms`
    pub fn format_duration(duration: Duration) -> String {
        let mut remaining = duration.as_secs();
        if remaining == 0 {
            return format!("{}ms", duration.subsec_millis());
        }

        let mut parts = Vec::with_capacity(UNITS.len());
        for (unit, secs) in UNITS {
            let count = remaining / secs;
            remaining %= secs;
            if count > 0 {
                parts.push(format!("{count}{unit}"));
            }
        }
        parts.join(" ")
    }

    /// Parse a retention string such as `30s`, `5m`, `1h` or `2d`
    ///
    /// A bare number is read as seconds.
    pub fn parse_duration(s: &str) -> Option<Duration> {
        let s = s.trim();
        if let Ok(secs) = s.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }

        let unit = s.chars().last()?;
        let (_, scale) = UNITS.iter().find(|(u, _)| *u == unit)?;
        let count: u64 = s[..s.len() - unit.len_utf8()].trim().parse().ok()?;
        count.checked_mul(*scale).map(Duration::from_secs)
    }
}

/// Path helpers
pub mod fs {
    use super::*;

    /// Replace a leading `~/` with the user's home directory
    pub fn expand_home(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }
}

/// Human-readable artifact size, e.g. `1.50 MB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut size = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if size < 1024.0 {
            break;
        }
        size /= 1024.0;
        unit = next;
    }
    format!("{size:.2} {unit}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_string() {
        let a = random_string(20);
        assert_eq!(a.len(), 20);
        assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(a, random_string(20));
        assert!(random_string(0).is_empty());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(time::format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(time::format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(time::format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(time::format_duration(Duration::from_secs(5445)), "1h 30m 45s");
        assert_eq!(time::format_duration(Duration::from_secs(90_000)), "1d 1h");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(time::parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(time::parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(time::parse_duration(" 1h "), Some(Duration::from_secs(3600)));
        assert_eq!(time::parse_duration("2d"), Some(Duration::from_secs(172_800)));
        assert_eq!(time::parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(time::parse_duration("abc"), None);
        assert_eq!(time::parse_duration("5w"), None);
        assert_eq!(time::parse_duration(""), None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1_572_864), "1.50 MB");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(fs::expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
    }
}
