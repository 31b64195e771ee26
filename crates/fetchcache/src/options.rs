use std::fmt;
use std::sync::Arc;

use crate::transport::{Priority, RequestModifier};

/// One of the two cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Disk,
}

/// Per-call settings of a fetch.
///
/// The defaults use both tiers, decode inline, and fetch with normal
/// priority.
#[derive(Clone)]
pub struct CacheOptions {
    /// Consult and populate the in-memory tier.
    pub use_memory: bool,
    /// Consult and populate the disk tier.
    pub use_disk: bool,
    /// Skip the cache lookup and re-download, overwriting the cached entry.
    pub force_refresh: bool,
    /// Decode downloaded content on a blocking worker thread instead of
    /// inline. Useful for converters with expensive decode steps.
    pub background_decode: bool,
    /// Urgency hint forwarded to the transport.
    pub priority: Priority,
    /// Hook to adjust the outgoing request, for example to attach
    /// authentication headers.
    pub request_modifier: Option<Arc<dyn RequestModifier>>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            use_memory: true,
            use_disk: true,
            force_refresh: false,
            background_decode: false,
            priority: Priority::default(),
            request_modifier: None,
        }
    }
}

impl CacheOptions {
    pub fn memory(mut self, enabled: bool) -> Self {
        self.use_memory = enabled;
        self
    }

    pub fn disk(mut self, enabled: bool) -> Self {
        self.use_disk = enabled;
        self
    }

    pub fn force_refresh(mut self, enabled: bool) -> Self {
        self.force_refresh = enabled;
        self
    }

    pub fn background_decode(mut self, enabled: bool) -> Self {
        self.background_decode = enabled;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn request_modifier(mut self, modifier: Arc<dyn RequestModifier>) -> Self {
        self.request_modifier = Some(modifier);
        self
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("use_memory", &self.use_memory)
            .field("use_disk", &self.use_disk)
            .field("force_refresh", &self.force_refresh)
            .field("background_decode", &self.background_decode)
            .field("priority", &self.priority)
            .field("request_modifier", &self.request_modifier.is_some())
            .finish()
    }
}
