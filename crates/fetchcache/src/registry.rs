use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::Cache;
use crate::config::CacheConfig;
use crate::convert::Convertible;

/// A registry of named cache instances.
///
/// Instances are keyed by value type and name, so a `"thumbnails"` cache of
/// `Bytes` and a `"thumbnails"` cache of some decoded image type coexist.
/// Typically one registry lives for the whole process.
#[derive(Default)]
pub struct CacheRegistry {
    caches: Mutex<HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache registered under `name`, if any.
    pub fn get<T: Convertible>(&self, name: &str) -> Option<Arc<Cache<T>>> {
        let caches = self.caches.lock();
        let entry = caches.get(&(TypeId::of::<Cache<T>>(), name.to_string()))?;
        entry.clone().downcast::<Cache<T>>().ok()
    }

    /// Returns the cache registered under `name`, creating it from `config`
    /// if absent.
    pub fn get_or_create<T: Convertible>(
        &self,
        name: &str,
        config: impl FnOnce() -> CacheConfig,
    ) -> Arc<Cache<T>> {
        let mut caches = self.caches.lock();
        let key = (TypeId::of::<Cache<T>>(), name.to_string());
        if let Some(entry) = caches.get(&key) {
            if let Ok(cache) = entry.clone().downcast::<Cache<T>>() {
                return cache;
            }
        }
        let cache = Arc::new(Cache::new(config()));
        caches.insert(key, cache.clone());
        cache
    }

    /// Drops the registration for `name`. Existing handles stay usable.
    pub fn remove<T: Convertible>(&self, name: &str) -> bool {
        self.caches
            .lock()
            .remove(&(TypeId::of::<Cache<T>>(), name.to_string()))
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            cache_dir: std::env::temp_dir().join("fetchcache-registry-tests"),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let registry = CacheRegistry::new();
        let first: Arc<Cache<Bytes>> = registry.get_or_create("thumbs", config);
        let second: Arc<Cache<Bytes>> = registry.get_or_create("thumbs", config);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_same_name_different_types_are_distinct() {
        let registry = CacheRegistry::new();
        let bytes: Arc<Cache<Bytes>> = registry.get_or_create("shared", config);
        let strings: Arc<Cache<String>> = registry.get_or_create("shared", config);
        // both registered independently
        assert!(registry.get::<Bytes>("shared").is_some());
        assert!(registry.get::<String>("shared").is_some());
        drop((bytes, strings));
    }

    #[test]
    fn test_remove_unregisters() {
        let registry = CacheRegistry::new();
        let _cache: Arc<Cache<Bytes>> = registry.get_or_create("gone", config);
        assert!(registry.remove::<Bytes>("gone"));
        assert!(registry.get::<Bytes>("gone").is_none());
        assert!(!registry.remove::<Bytes>("gone"));
    }
}
