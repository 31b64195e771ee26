use std::error::Error;
use std::io;

use thiserror::Error;

/// An error produced while looking up, downloading, or converting a cached
/// resource.
///
/// Failures of user-initiated lookups and fetches are always surfaced through
/// this type. Failures of maintenance operations (sweeps, clears) are logged
/// and swallowed instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// There is no cached entry, or the remote responded with a 404.
    #[error("not found")]
    NotFound,
    /// The remote refused the request (401/403).
    ///
    /// The attached string contains the remote's status line.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The remote failed with a 5xx response.
    #[error("server error: {0}")]
    Server(String),
    /// The download failed for another reason: an unexpected status code,
    /// connection loss, or DNS resolution trouble.
    #[error("download failed: {0}")]
    ServiceMissing(String),
    /// The raw content was fetched successfully but could not be decoded
    /// into the typed value.
    #[error("malformed content: {0}")]
    InvalidFormat(String),
    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(String),
    /// The in-flight download was cancelled before it produced a result.
    #[error("fetch cancelled")]
    Cancelled,
}

/// The result of a cache operation, containing either `Ok(T)` or the reason
/// why the item is unavailable.
pub type CacheEntry<T = ()> = Result<T, CacheError>;

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        let mut source: &dyn Error = &err;
        while let Some(inner) = source.source() {
            source = inner;
        }
        Self::ServiceMissing(source.to_string())
    }
}
