//! The abstract download capability consumed by the fetch coordinator.
//!
//! The coordinator only depends on the [`Transport`] trait; the bundled
//! [`HttpTransport`] covers plain HTTP(S) sources and custom transports can
//! be plugged in for anything else.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use url::Url;

use crate::error::CacheEntry;

mod http;

pub use http::HttpTransport;

/// A progress update for one in-flight download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Bytes transferred so far.
    pub transferred: u64,
    /// Expected total, if the remote reported one.
    pub total: Option<u64>,
}

impl Progress {
    /// The completed fraction in `0.0..=1.0`, `0.0` when the total is unknown.
    pub fn fraction(&self) -> f64 {
        match self.total {
            Some(total) if total > 0 => self.transferred as f64 / total as f64,
            _ => 0.0,
        }
    }
}

/// Channel on which callers receive progress updates of a fetch.
pub type ProgressSender = mpsc::UnboundedSender<Progress>;

/// Callback a transport invokes with progress updates while downloading.
///
/// Invoked synchronously from the transport, so updates are fully delivered
/// before the fetch resolves.
pub type ProgressReporter = Arc<dyn Fn(Progress) + Send + Sync>;

/// Download urgency hint, forwarded to the transport.
///
/// Advisory: transports without a priority mechanism may ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Hook to adjust an outgoing request before the transport issues it.
pub trait RequestModifier: Send + Sync + 'static {
    fn modify(&self, request: &mut FetchRequest);
}

/// Descriptor for one download.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    /// Additional header pairs to send.
    pub headers: Vec<(String, String)>,
    pub priority: Priority,
    /// When set, the transport streams the body to this path instead of
    /// buffering it in memory.
    pub staging_path: Option<PathBuf>,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
            priority: Priority::default(),
            staging_path: None,
        }
    }
}

/// The terminal payload of a successful download.
#[derive(Debug)]
pub enum Payload {
    /// The body, buffered in memory.
    Bytes(Bytes),
    /// The body was streamed to the request's staging path.
    File(PathBuf),
}

/// A source of remote content.
///
/// Exactly one terminal result per fetch; progress is reported through the
/// given callback as the body streams in. The transport performs no retries
/// of its own beyond whatever its protocol mandates.
pub trait Transport: Send + Sync + 'static {
    fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressReporter,
    ) -> BoxFuture<'static, CacheEntry<Payload>>;
}
