//! In-memory media blob cache with LRU eviction
//!
//! Fetches media resources by URL through a [`MediaSource`], keeps the bytes
//! in memory keyed by URL, and evicts least-recently-used entries so the
//! cache never holds more than its byte budget. Concurrent fetches of the
//! same URL share a single underlying request.

mod cache;
mod error;
mod source;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
mod types;

pub use cache::BlobCache;
pub use error::{CacheError, FetchError, Result};
pub use source::MediaSource;
pub use types::{CacheStats, FetchedMedia, MediaHandle, MediaMetadata, ReleaseSignal};
