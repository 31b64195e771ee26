//! The user-facing cache facade, tying the tiers, the fetch coordinator,
//! and the event streams together.

use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::config::CacheConfig;
use crate::convert::{Convertible, DataSource};
use crate::disk::DiskCache;
use crate::error::{CacheEntry, CacheError};
use crate::events::CacheEvents;
use crate::fetcher::Fetcher;
use crate::key::CacheKey;
use crate::memory::MemoryCache;
use crate::options::{CacheOptions, CacheTier};
use crate::transport::{HttpTransport, ProgressSender, Transport};

/// A two-tier cache of remote content, addressed by URL.
///
/// Values of type `T` live decoded in a bounded in-memory tier and encoded
/// as one file per key in a disk tier. A fetch consults memory, then disk,
/// then downloads; concurrent fetches of the same URL share one download.
///
/// All methods take `&self`; wrap the cache in an [`Arc`] to share it.
pub struct Cache<T: Convertible> {
    config: CacheConfig,
    memory: Arc<MemoryCache<T>>,
    disk: Arc<DiskCache>,
    events: Arc<CacheEvents<T>>,
    fetcher: Fetcher<T>,
}

impl<T: Convertible> Cache<T> {
    /// Creates a cache that downloads over HTTP(S).
    pub fn new(config: CacheConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::default()))
    }

    /// Creates a cache with a custom transport.
    pub fn with_transport(config: CacheConfig, transport: Arc<dyn Transport>) -> Self {
        let memory = Arc::new(MemoryCache::new(config.max_memory_cost));
        let disk = Arc::new(DiskCache::new(
            config.cache_dir.clone(),
            config.file_extension.clone(),
        ));
        let events = Arc::new(CacheEvents::new());
        let fetcher = Fetcher::new(transport, disk.clone(), memory.clone(), events.clone());
        Self {
            config,
            memory,
            disk,
            events,
            fetcher,
        }
    }

    /// The event streams of this cache.
    pub fn events(&self) -> &CacheEvents<T> {
        &self.events
    }

    /// The derived key `url` is cached under.
    pub fn key_for(&self, url: &Url) -> CacheKey {
        CacheKey::from_url(url)
    }

    /// The canonical disk path for `url`, whether or not an entry exists.
    pub fn cache_path(&self, url: &Url) -> PathBuf {
        self.disk.entry_path(&self.key_for(url))
    }

    /// Returns the cached value for `url`, consulting memory and then disk,
    /// or fetches it from the remote.
    pub async fn fetch(&self, url: &Url, options: CacheOptions) -> CacheEntry<T> {
        self.fetch_with_progress(url, options, None).await
    }

    /// Like [`fetch`](Self::fetch), additionally reporting download progress
    /// on the given channel. Cache hits resolve without any progress updates.
    pub async fn fetch_with_progress(
        &self,
        url: &Url,
        options: CacheOptions,
        progress: Option<ProgressSender>,
    ) -> CacheEntry<T> {
        let key = self.key_for(url);
        if !options.force_refresh {
            if let Some(value) = self.lookup(&key, &options).await {
                return Ok(value);
            }
        }
        self.fetcher.fetch(key, url.clone(), &options, progress).await
    }

    /// Returns the cached value for `url` without ever downloading.
    ///
    /// Reports why the value is unavailable: [`CacheError::NotFound`] for a
    /// plain miss, [`CacheError::InvalidFormat`] for an entry that exists
    /// but does not decode, [`CacheError::Io`] for an unreadable entry.
    pub async fn get(&self, url: &Url) -> CacheEntry<T> {
        let key = self.key_for(url);
        if let Some(value) = self.memory.get(&key) {
            return Ok(value);
        }
        let bytes = self.disk.read(&key).await?;
        let value = T::decode(DataSource::Bytes(&bytes)).ok_or_else(undecodable::<T>)?;
        self.memory.insert(key, value.clone());
        Ok(value)
    }

    /// Blocking variant of [`get`](Self::get).
    ///
    /// Must not be called from an async context; meant for callers outside
    /// the runtime, such as synchronous rendering code.
    pub fn get_sync(&self, url: &Url) -> CacheEntry<T> {
        let key = self.key_for(url);
        if let Some(value) = self.memory.get(&key) {
            return Ok(value);
        }
        let bytes = self.disk.read_sync(&key)?;
        let value = T::decode(DataSource::Bytes(&bytes)).ok_or_else(undecodable::<T>)?;
        self.memory.insert(key, value.clone());
        Ok(value)
    }

    /// Returns the value for `url` from the memory tier only. Never touches
    /// the filesystem.
    pub fn get_memory(&self, url: &Url) -> Option<T> {
        self.memory.get(&self.key_for(url))
    }

    /// Stores a value for `url` directly, without downloading, populating
    /// both tiers.
    pub async fn save(&self, url: &Url, value: T) -> CacheEntry {
        let key = self.key_for(url);
        let encoded = value.encode().ok_or_else(|| {
            CacheError::InvalidFormat(format!(
                "cannot encode {} for the disk tier",
                std::any::type_name::<T>()
            ))
        })?;
        self.memory.insert(key.clone(), value);
        if self.disk.write(&key, &encoded).await {
            Ok(())
        } else {
            Err(CacheError::Io("disk cache write failed".into()))
        }
    }

    /// Removes the entry for `url` from the memory tier, and from the disk
    /// tier as well when `from_disk` is set.
    pub async fn remove(&self, url: &Url, from_disk: bool) -> CacheEntry {
        let key = self.key_for(url);
        self.memory.remove(&key);
        if from_disk {
            self.disk.remove(&key).await?;
        }
        Ok(())
    }

    /// Drops every entry of the memory tier.
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    /// Deletes every file of the disk tier. In-flight downloads are not
    /// affected and will re-populate it.
    pub async fn clear_disk(&self) -> CacheEntry {
        self.disk.remove_all().await
    }

    /// Runs one eviction sweep over the disk tier.
    ///
    /// Entries older than the configured `max_age` are removed; if the tier
    /// still exceeds `max_disk_bytes`, the oldest entries are evicted down
    /// to half the budget. The removed paths are returned, and broadcast
    /// when the sweep removed anything.
    pub async fn clean_expired(&self) -> Vec<PathBuf> {
        let removed = self
            .disk
            .sweep(self.config.max_age, self.config.max_disk_bytes)
            .await;
        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), "disk sweep evicted entries");
            self.events.emit_cleaned(removed.clone());
        }
        removed
    }

    /// Whether an entry for `url` exists in the given tier.
    pub async fn is_cached(&self, url: &Url, tier: CacheTier) -> bool {
        let key = self.key_for(url);
        match tier {
            CacheTier::Memory => self.memory.contains(&key),
            CacheTier::Disk => self.disk.exists(&key).await,
        }
    }

    /// Whether a download for `url` is currently in flight.
    pub fn is_fetching(&self, url: &Url) -> bool {
        self.fetcher.is_fetching(&self.key_for(url))
    }

    /// Cancels the in-flight download for `url`, if any.
    ///
    /// Waiting fetches resolve with [`CacheError::Cancelled`]. With
    /// `stop_transport` the download itself is aborted; otherwise it
    /// continues detached and still populates the cache when it finishes.
    pub fn cancel_fetching(&self, url: &Url, stop_transport: bool) -> bool {
        self.fetcher.cancel(&self.key_for(url), url, stop_transport)
    }

    /// Tier lookup for the fetch path; any failure is treated as a miss and
    /// falls through to the network.
    async fn lookup(&self, key: &CacheKey, options: &CacheOptions) -> Option<T> {
        if options.use_memory {
            if let Some(value) = self.memory.get(key) {
                return Some(value);
            }
        }
        if !options.use_disk {
            return None;
        }
        let bytes = self.disk.read(key).await.ok()?;
        let value = if options.background_decode {
            tokio::task::spawn_blocking(move || T::decode(DataSource::Bytes(&bytes)))
                .await
                .unwrap_or(None)?
        } else {
            T::decode(DataSource::Bytes(&bytes))?
        };
        if options.use_memory {
            self.memory.insert(key.clone(), value.clone());
        }
        Some(value)
    }
}

fn undecodable<T>() -> CacheError {
    CacheError::InvalidFormat(format!(
        "cannot decode cached content into {}",
        std::any::type_name::<T>()
    ))
}
