use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use url::Url;

/// The derived, fixed-form key a resource is stored under.
///
/// Keys are the SHA-256 of the identifier string, hex encoded, so they are
/// stable across processes (a persisted cache stays valid) and safe to use
/// as filename stems without any escaping.
#[derive(Debug, Clone, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub struct CacheKey {
    key: String,
}

impl CacheKey {
    /// Derives the key for a URL identifier.
    pub fn from_url(url: &Url) -> Self {
        Self::from_identifier(url.as_str())
    }

    /// Derives the key for an arbitrary identifier string.
    pub fn from_identifier(identifier: &str) -> Self {
        let digest = Sha256::digest(identifier.as_bytes());
        Self {
            key: hex::encode(digest),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Returns the canonical path for this key inside `cache_dir`.
    ///
    /// A non-empty `extension` is appended as a file extension.
    pub fn cache_path(&self, cache_dir: &Path, extension: &str) -> PathBuf {
        let mut file_name = self.key.clone();
        if !extension.is_empty() {
            file_name.push('.');
            file_name.push_str(extension);
        }
        cache_dir.join(file_name)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable() {
        let url = Url::parse("https://example.org/images/a.png").unwrap();
        assert_eq!(CacheKey::from_url(&url), CacheKey::from_url(&url));
    }

    #[test]
    fn test_distinct_identifiers_distinct_keys() {
        let a = CacheKey::from_identifier("https://example.org/a");
        let b = CacheKey::from_identifier("https://example.org/b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_path_extension() {
        let key = CacheKey::from_identifier("x");
        let dir = Path::new("/cache");
        let plain = key.cache_path(dir, "");
        let with_ext = key.cache_path(dir, "png");
        assert_eq!(plain.extension(), None);
        assert_eq!(with_ext.extension().unwrap(), "png");
        assert_eq!(with_ext.file_stem().unwrap(), plain.file_name().unwrap());
    }
}
