//! Cache types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Optional stream properties reported by the media source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_ms: u64,
    pub width: u32,
    pub height: u32,
}

/// A resource as returned by a [`MediaSource`](crate::MediaSource)
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub payload: Bytes,
    pub content_type: String,
    pub metadata: Option<MediaMetadata>,
}

impl FetchedMedia {
    pub fn new(payload: impl Into<Bytes>, content_type: &str) -> Self {
        Self {
            payload: payload.into(),
            content_type: content_type.to_string(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One-shot "resource freed" flag shared between an owner and its holders
#[derive(Debug, Clone)]
pub struct ReleaseSignal(Arc<watch::Sender<bool>>);

impl ReleaseSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self(Arc::new(tx))
    }

    /// Mark the resource as freed and wake everyone waiting on it
    pub fn release(&self) {
        self.0.send_replace(true);
    }

    pub fn is_released(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once [`release`](Self::release) has been called
    pub async fn released(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives in `self`, so this only returns once released.
        let _ = rx.wait_for(|released| *released).await;
    }
}

impl Default for ReleaseSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque handle to fetched media bytes.
///
/// Cached handles are invalidated when their entry is evicted, removed or
/// the cache is cleared. Uncached handles (items larger than the whole
/// budget) own their bytes and are never released.
#[derive(Debug, Clone)]
pub struct MediaHandle {
    url: String,
    payload: Bytes,
    content_type: String,
    metadata: Option<MediaMetadata>,
    release: Option<ReleaseSignal>,
}

impl MediaHandle {
    pub(crate) fn cached(url: &str, media: &FetchedMedia, release: ReleaseSignal) -> Self {
        Self {
            url: url.to_string(),
            payload: media.payload.clone(),
            content_type: media.content_type.clone(),
            metadata: media.metadata,
            release: Some(release),
        }
    }

    pub(crate) fn uncached(url: &str, media: FetchedMedia) -> Self {
        Self {
            url: url.to_string(),
            payload: media.payload,
            content_type: media.content_type,
            metadata: media.metadata,
            release: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn metadata(&self) -> Option<MediaMetadata> {
        self.metadata
    }

    pub fn byte_size(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Whether the bytes behind this handle are owned by the cache
    pub fn is_cached(&self) -> bool {
        self.release.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.release
            .as_ref()
            .map(ReleaseSignal::is_released)
            .unwrap_or(false)
    }

    /// Resolves when the cache frees this entry; pending forever for uncached handles
    pub async fn released(&self) {
        match &self.release {
            Some(signal) => signal.released().await,
            None => std::future::pending().await,
        }
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub byte_budget: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Fetches that joined an already in-flight request for the same URL
    pub coalesced: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
}
