use moka::sync::Cache as MokaCache;

use crate::convert::Convertible;
use crate::key::CacheKey;

/// The in-memory tier: a bounded-cost store of decoded values.
///
/// Eviction is delegated to the underlying cost-weighted cache; entries are
/// weighed by [`Convertible::cost`] and evicted automatically once the total
/// exceeds the configured limit.
#[derive(Debug)]
pub struct MemoryCache<T: Convertible> {
    inner: MokaCache<CacheKey, T>,
}

impl<T: Convertible> MemoryCache<T> {
    /// Creates a store bounded by `max_cost` total weight, unbounded if `0`.
    pub fn new(max_cost: u64) -> Self {
        let mut builder = MokaCache::builder().weigher(|_key: &CacheKey, value: &T| value.cost().max(1));
        if max_cost > 0 {
            builder = builder.max_capacity(max_cost);
        }
        Self {
            inner: builder.build(),
        }
    }

    pub fn insert(&self, key: CacheKey, value: T) {
        self.inner.insert(key, value);
    }

    pub fn get(&self, key: &CacheKey) -> Option<T> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.contains_key(key)
    }

    pub fn remove(&self, key: &CacheKey) {
        self.inner.invalidate(key);
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    #[cfg(test)]
    fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}
