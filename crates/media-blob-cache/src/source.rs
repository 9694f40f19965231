//! Media source collaborator

use crate::error::Result;
use crate::types::{FetchedMedia, MediaHandle};
use async_trait::async_trait;

/// Anything that can load a media resource by URL.
///
/// The cache makes no assumption about transport; it only needs a byte
/// payload on success and a [`FetchError`](crate::FetchError) on failure.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Load the resource behind `url`
    async fn fetch(&self, url: &str) -> Result<FetchedMedia>;

    /// Check that enough of the resource is present to play through
    /// without stalling.
    async fn probe(&self, media: &MediaHandle) -> Result<()> {
        if media.payload().is_empty() {
            return Err(crate::FetchError::Unsupported(format!(
                "{} has an empty payload",
                media.url()
            )));
        }
        Ok(())
    }
}
