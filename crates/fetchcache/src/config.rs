use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for one cache instance.
///
/// All user-configurable knobs of a cache live here. Durations deserialize
/// in humantime notation (`"7days"`, `"90s"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory to store cache files in. Created lazily on first use.
    pub cache_dir: PathBuf,

    /// File extension appended to the derived key of every cache file.
    ///
    /// Empty by default, in which case files are named by their bare key.
    pub file_extension: String,

    /// Maximum total cost of the in-memory tier, in converter cost units.
    ///
    /// `0` leaves the memory tier unbounded.
    pub max_memory_cost: u64,

    /// Maximum total size of the disk tier in bytes.
    ///
    /// When a sweep finds the tier above this limit it evicts down to half
    /// of it. `0` disables size-based eviction.
    pub max_disk_bytes: u64,

    /// Entries whose modification time is older than this are removed by a
    /// sweep, regardless of the size budget.
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("fetchcache"),
            file_extension: String::new(),
            max_memory_cost: 0,
            max_disk_bytes: 0,
            max_age: Duration::from_secs(86400 * 7),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_age_is_one_week() {
        assert_eq!(CacheConfig::default().max_age, Duration::from_secs(604800));
    }

    #[test]
    fn test_deserialize_humantime_durations() {
        let yaml = r#"
            cache_dir: "/var/cache/thumbs"
            file_extension: "bin"
            max_disk_bytes: 1048576
            max_age: "3days 12h"
        "#;
        let config: CacheConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/thumbs"));
        assert_eq!(config.file_extension, "bin");
        assert_eq!(config.max_disk_bytes, 1048576);
        assert_eq!(config.max_age, Duration::from_secs(86400 * 3 + 3600 * 12));
        // unspecified fields fall back to defaults
        assert_eq!(config.max_memory_cost, 0);
    }
}
