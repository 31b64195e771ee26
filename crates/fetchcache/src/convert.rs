use std::path::Path;

use bytes::Bytes;

/// Raw content handed to a converter, either in memory or staged on disk.
#[derive(Debug, Clone, Copy)]
pub enum DataSource<'a> {
    Bytes(&'a [u8]),
    Path(&'a Path),
}

/// Conversion between raw cached bytes and a typed value.
///
/// Implemented by the value type itself, one implementation per cached
/// content type. `decode(encode(v))` must reproduce `v` so that values
/// round-trip through the disk tier.
pub trait Convertible: Clone + Send + Sync + 'static {
    /// Decodes a value from raw content, `None` if the content is malformed.
    fn decode(source: DataSource<'_>) -> Option<Self>;

    /// Encodes the value back into raw bytes, `None` if it cannot be
    /// represented.
    fn encode(&self) -> Option<Bytes>;

    /// The memory-tier cost of the value, in arbitrary units.
    ///
    /// Used as the eviction weight of the in-memory store.
    fn cost(&self) -> u32 {
        1
    }
}

impl Convertible for Bytes {
    fn decode(source: DataSource<'_>) -> Option<Self> {
        match source {
            DataSource::Bytes(bytes) => Some(Bytes::copy_from_slice(bytes)),
            DataSource::Path(path) => std::fs::read(path).ok().map(Bytes::from),
        }
    }

    fn encode(&self) -> Option<Bytes> {
        Some(self.clone())
    }

    fn cost(&self) -> u32 {
        self.len().try_into().unwrap_or(u32::MAX)
    }
}

impl Convertible for String {
    fn decode(source: DataSource<'_>) -> Option<Self> {
        match source {
            DataSource::Bytes(bytes) => String::from_utf8(bytes.to_vec()).ok(),
            DataSource::Path(path) => std::fs::read_to_string(path).ok(),
        }
    }

    fn encode(&self) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(self.as_bytes()))
    }

    fn cost(&self) -> u32 {
        self.len().try_into().unwrap_or(u32::MAX)
    }
}
