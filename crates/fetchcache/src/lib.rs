//! A two-tier cache for URL-addressed remote content.
//!
//! Values live decoded in a bounded in-memory tier and encoded as one file
//! per key in a disk tier. Fetching consults memory, then disk, then
//! downloads from the remote; concurrent fetches of the same URL share one
//! download, with every caller receiving its progress and terminal result.
//!
//! The central type is [`Cache`], parameterized over a [`Convertible`] value
//! type that defines how raw content becomes a typed value and back.
//!
//! ```no_run
//! use bytes::Bytes;
//! use fetchcache::{Cache, CacheConfig, CacheOptions};
//! use url::Url;
//!
//! # async fn example() -> Result<(), fetchcache::CacheError> {
//! let cache: Cache<Bytes> = Cache::new(CacheConfig::default());
//! let url = Url::parse("https://example.org/logo.png").unwrap();
//! let logo = cache.fetch(&url, CacheOptions::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Disk entries are evicted by [`Cache::clean_expired`]: entries older than
//! the configured age are removed, and when the tier exceeds its size budget
//! the oldest entries are evicted down to half of it. Sweeps are explicit;
//! schedule them however fits the embedding application.

mod cache;
mod config;
mod convert;
mod disk;
mod error;
mod events;
mod fetcher;
mod key;
mod memory;
mod options;
mod registry;
mod transport;
mod utils;

pub use cache::Cache;
pub use config::CacheConfig;
pub use convert::{Convertible, DataSource};
pub use error::{CacheEntry, CacheError};
pub use events::{CacheEvents, CleanedEvent, DownloadedEvent, ProgressEvent};
pub use key::CacheKey;
pub use options::{CacheOptions, CacheTier};
pub use registry::CacheRegistry;
pub use transport::{
    FetchRequest, HttpTransport, Payload, Priority, Progress, ProgressReporter, ProgressSender,
    RequestModifier, Transport,
};
