use std::path::PathBuf;

use tokio::sync::broadcast;
use url::Url;

use crate::convert::Convertible;
use crate::error::CacheEntry;
use crate::transport::Progress;

/// Buffered events per stream before slow subscribers start losing the
/// oldest ones.
const CHANNEL_CAPACITY: usize = 64;

/// A finished download attempt, successful or not.
///
/// Every download produces exactly one of these, including downloads that
/// were cancelled before completing.
#[derive(Debug, Clone)]
pub struct DownloadedEvent<T> {
    pub url: Url,
    pub result: CacheEntry<T>,
}

/// A progress update of an in-flight download.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub url: Url,
    pub progress: Progress,
}

/// A finished disk sweep, listing the files it removed.
#[derive(Debug, Clone)]
pub struct CleanedEvent {
    pub removed: Vec<PathBuf>,
}

/// The broadcast event streams of one cache instance.
///
/// Streams are independent and multi-subscriber. Subscribing only captures
/// events emitted afterwards; a subscriber that lags more than the channel
/// capacity behind loses the oldest events.
pub struct CacheEvents<T> {
    downloaded: broadcast::Sender<DownloadedEvent<T>>,
    progress: broadcast::Sender<ProgressEvent>,
    cleaned: broadcast::Sender<CleanedEvent>,
}

impl<T: Convertible> CacheEvents<T> {
    pub(crate) fn new() -> Self {
        Self {
            downloaded: broadcast::channel(CHANNEL_CAPACITY).0,
            progress: broadcast::channel(CHANNEL_CAPACITY).0,
            cleaned: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe_downloaded(&self) -> broadcast::Receiver<DownloadedEvent<T>> {
        self.downloaded.subscribe()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    pub fn subscribe_cleaned(&self) -> broadcast::Receiver<CleanedEvent> {
        self.cleaned.subscribe()
    }

    pub(crate) fn emit_downloaded(&self, url: Url, result: CacheEntry<T>) {
        self.downloaded.send(DownloadedEvent { url, result }).ok();
    }

    pub(crate) fn emit_progress(&self, url: Url, progress: Progress) {
        self.progress.send(ProgressEvent { url, progress }).ok();
    }

    pub(crate) fn emit_cleaned(&self, removed: Vec<PathBuf>) {
        self.cleaned.send(CleanedEvent { removed }).ok();
    }
}
