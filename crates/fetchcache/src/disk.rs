use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::error::{CacheEntry, CacheError};
use crate::key::CacheKey;

/// Prefix for staging files created in the cache directory.
///
/// The leading dot keeps them hidden from [`DiskCache::scan`], so a sweep
/// can never remove a download that is still being written.
const STAGING_PREFIX: &str = ".staging";

/// The disk tier: one file per key under a managed directory.
///
/// The filesystem is the only index; a file at the canonical per-key path
/// *is* the cached content, with size and modification time as its only
/// tracked metadata. All mutating operations and sweeps serialize on one
/// per-instance lock so directory mutation never interleaves.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    extension: String,
    io_lock: Mutex<()>,
}

/// A file found by [`DiskCache::scan`].
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl DiskCache {
    pub fn new(dir: PathBuf, extension: String) -> Self {
        Self {
            dir,
            extension,
            io_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the canonical path for `key`, creating the cache directory if
    /// it does not exist yet.
    ///
    /// Directory creation failure is logged but the path is still returned;
    /// the subsequent read or write surfaces the real error to the caller.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.ensure_dir();
        key.cache_path(&self.dir, &self.extension)
    }

    fn ensure_dir(&self) {
        if !self.dir.exists() {
            if let Err(err) = std::fs::create_dir_all(&self.dir) {
                tracing::error!(
                    error = %err,
                    dir = %self.dir.display(),
                    "failed to create cache directory"
                );
            }
        }
    }

    /// Creates a staging file for a download, in the cache directory so the
    /// final rename stays on one filesystem.
    pub fn staging_file(&self) -> std::io::Result<NamedTempFile> {
        self.ensure_dir();
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.dir)
    }

    /// Moves a finished staging file to the canonical path for `key`.
    ///
    /// Unless `overwrite` is set, an entry that appeared at the canonical
    /// path in the meantime wins and the staged copy is discarded.
    pub async fn commit_staging(
        &self,
        key: &CacheKey,
        staging: NamedTempFile,
        overwrite: bool,
    ) -> bool {
        let _guard = self.io_lock.lock().await;
        let path = self.entry_path(key);
        let result = if overwrite {
            staging.persist(&path)
        } else {
            staging.persist_noclobber(&path)
        };
        match result {
            Ok(_) => true,
            Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %path.display(), "concurrent producer won, discarding staged copy");
                false
            }
            Err(err) => {
                tracing::error!(
                    error = %err.error,
                    path = %path.display(),
                    "failed to commit staged download"
                );
                false
            }
        }
    }

    pub async fn exists(&self, key: &CacheKey) -> bool {
        tokio::fs::metadata(self.entry_path(key))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    pub fn exists_sync(&self, key: &CacheKey) -> bool {
        self.entry_path(key).is_file()
    }

    pub async fn read(&self, key: &CacheKey) -> CacheEntry<Bytes> {
        let _guard = self.io_lock.lock().await;
        let path = self.entry_path(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(error = %err, path = %path.display(), "disk cache read failed");
                }
                Err(err.into())
            }
        }
    }

    /// Blocking variant of [`read`](Self::read).
    ///
    /// Must not be called from an async context.
    pub fn read_sync(&self, key: &CacheKey) -> CacheEntry<Bytes> {
        let _guard = self.io_lock.blocking_lock();
        let path = self.entry_path(key);
        match std::fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes `data` at the canonical path via create-or-truncate.
    ///
    /// Not atomic against concurrent readers of the same key; the fetch path
    /// uses [`staging_file`](Self::staging_file) plus rename for that.
    pub async fn write(&self, key: &CacheKey, data: &[u8]) -> bool {
        let _guard = self.io_lock.lock().await;
        let path = self.entry_path(key);
        match tokio::fs::write(&path, data).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, path = %path.display(), "disk cache write failed");
                false
            }
        }
    }

    /// Removes the entry for `key`. Removing an absent entry is a no-op.
    pub async fn remove(&self, key: &CacheKey) -> CacheEntry {
        let _guard = self.io_lock.lock().await;
        let path = self.entry_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::Io(err.to_string())),
        }
    }

    /// Deletes and recreates the cache directory.
    pub async fn remove_all(&self) -> CacheEntry {
        let _guard = self.io_lock.lock().await;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(CacheError::Io(err.to_string())),
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| CacheError::Io(err.to_string()))
    }

    /// Enumerates cache files with their metadata.
    ///
    /// Hidden entries and directories are skipped; entries whose metadata
    /// cannot be read are logged and excluded rather than failing the scan.
    pub async fn scan(&self) -> Vec<ScanEntry> {
        let _guard = self.io_lock.lock().await;
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || scan_dir(&dir))
            .await
            .unwrap_or_default()
    }

    /// Runs one eviction pass and returns the removed paths.
    ///
    /// Entries older than `max_age` are removed unconditionally. If the
    /// remaining files still exceed `max_bytes` (when non-zero), the oldest
    /// entries are removed until usage drops below half the budget.
    pub async fn sweep(&self, max_age: Duration, max_bytes: u64) -> Vec<PathBuf> {
        let _guard = self.io_lock.lock().await;
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || sweep_dir(&dir, max_age, max_bytes))
            .await
            .unwrap_or_default()
    }
}

fn scan_dir(dir: &Path) -> Vec<ScanEntry> {
    let mut entries = Vec::new();
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %err, dir = %dir.display(), "cache directory scan failed");
            }
            return entries;
        }
    };
    for entry in read_dir {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if hidden {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "skipping entry without metadata");
                continue;
            }
        };
        if metadata.is_dir() {
            continue;
        }
        entries.push(ScanEntry {
            path,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        });
    }
    entries
}

fn sweep_dir(dir: &Path, max_age: Duration, max_bytes: u64) -> Vec<PathBuf> {
    let cutoff = SystemTime::now().checked_sub(max_age);
    let mut removed = Vec::new();
    let mut retained = Vec::new();
    let mut total_size: u64 = 0;

    for entry in scan_dir(dir) {
        let expired = match (cutoff, entry.modified) {
            (Some(cutoff), Some(modified)) => modified < cutoff,
            _ => false,
        };
        if expired {
            if remove_swept(&entry.path) {
                removed.push(entry.path);
            }
            continue;
        }
        total_size += entry.size;
        retained.push(entry);
    }

    if max_bytes > 0 && total_size > max_bytes {
        // Free down to half capacity rather than to the limit, so sweeps do
        // not thrash right at the boundary.
        let target_size = max_bytes / 2;
        // Oldest first; entries without a usable mtime sort first and are
        // evicted immediately.
        retained.sort_by_key(|entry| entry.modified);
        for entry in retained {
            if remove_swept(&entry.path) {
                total_size = total_size.saturating_sub(entry.size);
                removed.push(entry.path);
            }
            if total_size < target_size {
                break;
            }
        }
    }

    removed
}

fn remove_swept(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::error!(error = %err, path = %path.display(), "failed to remove swept cache file");
            false
        }
    }
}
