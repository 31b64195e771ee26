//! Coordinates downloads so that concurrent fetches of the same key share
//! one transport request.
//!
//! The first fetch of a key spawns a download task and registers an
//! in-flight entry; later fetches of the same key attach as waiters instead
//! of downloading again. Every waiter receives the progress updates and
//! exactly one terminal result of the shared download.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::channel::oneshot;
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use url::Url;

use crate::convert::{Convertible, DataSource};
use crate::disk::DiskCache;
use crate::error::{CacheEntry, CacheError};
use crate::events::CacheEvents;
use crate::key::CacheKey;
use crate::memory::MemoryCache;
use crate::options::CacheOptions;
use crate::transport::{
    FetchRequest, Payload, Progress, ProgressReporter, ProgressSender, Transport,
};
use crate::utils::CallOnDrop;

/// One party waiting on an in-flight download.
struct Waiter<T> {
    /// Per-waiter progress sink, if the waiter asked for one.
    progress: Option<ProgressSender>,
    /// Receives the terminal result, exactly once.
    done: oneshot::Sender<CacheEntry<T>>,
}

/// Book-keeping for one in-flight download.
struct InFlight<T> {
    /// Identifies the download attempt that owns this entry.
    ///
    /// A new download of the same key after a cancellation gets a fresh
    /// generation, so a straggling completion of the old attempt cannot
    /// remove the successor's entry.
    generation: u64,
    abort: AbortHandle,
    waiters: Vec<Waiter<T>>,
}

type InFlightMap<T> = Arc<Mutex<BTreeMap<CacheKey, InFlight<T>>>>;

/// Deduplicates concurrent downloads per cache key.
pub(crate) struct Fetcher<T: Convertible> {
    transport: Arc<dyn Transport>,
    disk: Arc<DiskCache>,
    memory: Arc<MemoryCache<T>>,
    events: Arc<CacheEvents<T>>,
    inflight: InFlightMap<T>,
    generation: AtomicU64,
}

impl<T: Convertible> Fetcher<T> {
    pub fn new(
        transport: Arc<dyn Transport>,
        disk: Arc<DiskCache>,
        memory: Arc<MemoryCache<T>>,
        events: Arc<CacheEvents<T>>,
    ) -> Self {
        Self {
            transport,
            disk,
            memory,
            events,
            inflight: Arc::new(Mutex::new(BTreeMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Downloads the resource for `key`, or attaches to the in-flight
    /// download of the same key if one exists.
    ///
    /// Resolves once the shared download reaches its terminal result.
    pub async fn fetch(
        &self,
        key: CacheKey,
        url: Url,
        options: &CacheOptions,
        progress: Option<ProgressSender>,
    ) -> CacheEntry<T> {
        let (done_tx, done_rx) = oneshot::channel();
        let waiter = Waiter {
            progress,
            done: done_tx,
        };

        {
            let mut inflight = self.inflight.lock();
            match inflight.get_mut(&key) {
                Some(entry) => {
                    tracing::debug!(%key, "attaching to in-flight download");
                    entry.waiters.push(waiter);
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    // The download task only touches the map under this same
                    // lock, so it cannot observe the map before the entry is
                    // inserted.
                    let abort = self.spawn_download(key.clone(), url, options, generation);
                    inflight.insert(
                        key,
                        InFlight {
                            generation,
                            abort,
                            waiters: vec![waiter],
                        },
                    );
                }
            }
        }

        match done_rx.await {
            Ok(result) => result,
            // the download task vanished without a terminal result
            Err(oneshot::Canceled) => Err(CacheError::Cancelled),
        }
    }

    /// Whether a download for `key` is currently in flight.
    pub fn is_fetching(&self, key: &CacheKey) -> bool {
        self.inflight.lock().contains_key(key)
    }

    /// Cancels the in-flight download for `key`, if any.
    ///
    /// All waiters receive [`CacheError::Cancelled`] as their terminal
    /// result, and a downloaded event with the same error is broadcast.
    /// With `stop_transport` the transport task is aborted as well;
    /// otherwise the download continues detached and still populates the
    /// cache when it finishes.
    pub fn cancel(&self, key: &CacheKey, url: &Url, stop_transport: bool) -> bool {
        let entry = self.inflight.lock().remove(key);
        let Some(entry) = entry else {
            return false;
        };
        tracing::debug!(%key, stop_transport, "cancelling in-flight download");
        if stop_transport {
            entry.abort.abort();
        }
        for waiter in entry.waiters {
            waiter.done.send(Err(CacheError::Cancelled)).ok();
        }
        self.events
            .emit_downloaded(url.clone(), Err(CacheError::Cancelled));
        true
    }

    fn spawn_download(
        &self,
        key: CacheKey,
        url: Url,
        options: &CacheOptions,
        generation: u64,
    ) -> AbortHandle {
        let transport = self.transport.clone();
        let disk = self.disk.clone();
        let memory = self.memory.clone();
        let events = self.events.clone();
        let inflight = self.inflight.clone();
        let options = options.clone();

        let task = async move {
            // Delivers a terminal result even if this task is aborted or
            // panics after the normal completion path became unreachable.
            let guard = {
                let inflight = inflight.clone();
                let events = events.clone();
                let key = key.clone();
                let url = url.clone();
                CallOnDrop::new(move || {
                    let waiters = take_waiters(&inflight, &key, generation);
                    if waiters.is_empty() {
                        return;
                    }
                    for waiter in waiters {
                        waiter.done.send(Err(CacheError::Cancelled)).ok();
                    }
                    events.emit_downloaded(url, Err(CacheError::Cancelled));
                })
            };

            // Fans each progress update out to the waiters attached at that
            // moment and the broadcast stream. Synchronous, so no update can
            // trail behind the terminal result.
            let reporter: ProgressReporter = {
                let inflight = inflight.clone();
                let events = events.clone();
                let key = key.clone();
                let url = url.clone();
                Arc::new(move |update: Progress| {
                    let sinks: Vec<ProgressSender> = {
                        let map = inflight.lock();
                        match map.get(&key) {
                            Some(entry) if entry.generation == generation => entry
                                .waiters
                                .iter()
                                .filter_map(|waiter| waiter.progress.clone())
                                .collect(),
                            _ => Vec::new(),
                        }
                    };
                    for sink in sinks {
                        sink.send(update).ok();
                    }
                    events.emit_progress(url.clone(), update);
                })
            };

            let result =
                download::<T>(transport.as_ref(), &disk, &key, &url, &options, reporter).await;

            if let Ok(value) = &result {
                if options.use_memory {
                    memory.insert(key.clone(), value.clone());
                }
            }

            let waiters = take_waiters(&inflight, &key, generation);
            for waiter in waiters {
                waiter.done.send(result.clone()).ok();
            }
            // Broadcast even if the entry was cancelled in the meantime; the
            // download did finish and its result is observable in the cache.
            events.emit_downloaded(url, result);
            drop(guard);
        };

        tokio::spawn(task).abort_handle()
    }
}

/// Removes the in-flight entry for `key` and returns its waiters, but only
/// if it still belongs to `generation`.
fn take_waiters<T>(inflight: &InFlightMap<T>, key: &CacheKey, generation: u64) -> Vec<Waiter<T>> {
    let mut map = inflight.lock();
    let matches = map
        .get(key)
        .is_some_and(|entry| entry.generation == generation);
    if !matches {
        return Vec::new();
    }
    map.remove(key).map(|entry| entry.waiters).unwrap_or_default()
}

/// Performs one download: transport fetch, disk commit, then decode.
///
/// Successfully downloaded raw content is committed to the disk tier before
/// decoding, so it is retained even when the typed conversion fails.
async fn download<T: Convertible>(
    transport: &dyn Transport,
    disk: &DiskCache,
    key: &CacheKey,
    url: &Url,
    options: &CacheOptions,
    progress: ProgressReporter,
) -> CacheEntry<T> {
    let staging = if options.use_disk {
        Some(disk.staging_file()?)
    } else {
        None
    };

    let mut request = FetchRequest::new(url.clone());
    request.priority = options.priority;
    request.staging_path = staging
        .as_ref()
        .map(|staging| staging.path().to_path_buf());
    if let Some(modifier) = &options.request_modifier {
        modifier.modify(&mut request);
    }

    let payload = transport.fetch(request, progress).await?;

    let source = match payload {
        Payload::File(path) => {
            let committed = match staging {
                Some(staging) => {
                    disk.commit_staging(key, staging, options.force_refresh).await;
                    disk.entry_path(key)
                }
                // the transport staged somewhere of its own accord
                None => path,
            };
            Payload::File(committed)
        }
        Payload::Bytes(bytes) => {
            if options.use_disk {
                disk.write(key, &bytes).await;
            }
            Payload::Bytes(bytes)
        }
    };

    decode_payload::<T>(source, options.background_decode).await
}

async fn decode_payload<T: Convertible>(payload: Payload, background: bool) -> CacheEntry<T> {
    fn decode<T: Convertible>(payload: &Payload) -> Option<T> {
        match payload {
            Payload::Bytes(bytes) => T::decode(DataSource::Bytes(bytes)),
            Payload::File(path) => T::decode(DataSource::Path(path)),
        }
    }

    let decoded = if background {
        tokio::task::spawn_blocking(move || decode::<T>(&payload))
            .await
            .unwrap_or(None)
    } else {
        decode::<T>(&payload)
    };

    decoded.ok_or_else(|| {
        CacheError::InvalidFormat(format!(
            "cannot decode downloaded content into {}",
            std::any::type_name::<T>()
        ))
    })
}
