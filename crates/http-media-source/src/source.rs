//! Media loading over HTTP(S)

use crate::error::{HttpSourceError, Result};
use async_trait::async_trait;
use media_blob_cache::{FetchError, FetchedMedia, MediaHandle, MediaSource};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const HLS_MAGIC: &[u8] = b"#EXTM3U";

/// Content types the player can hand to a video element
pub fn is_playable_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    mime.starts_with("video/")
        || mime.starts_with("audio/")
        || mime == DEFAULT_CONTENT_TYPE
        || is_hls(&mime)
}

fn is_hls(mime: &str) -> bool {
    mime == "application/vnd.apple.mpegurl" || mime == "application/x-mpegurl"
}

/// HTTP client for fetching media resources
pub struct HttpMediaSource {
    client: Client,
}

impl HttpMediaSource {
    /// Create a new media source with a default client
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a media source around a preconfigured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn parse_url(url: &str) -> Result<Url> {
        let parsed = Url::parse(url).map_err(|e| HttpSourceError::InvalidUrl(e.to_string()))?;

        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(HttpSourceError::InvalidUrl(format!(
                "unsupported scheme {}",
                scheme
            ))),
        }
    }

    async fn load(&self, url: &str) -> Result<FetchedMedia> {
        let parsed = Self::parse_url(url)?;
        debug!(url = %parsed, "Fetching media over HTTP");

        let response = self.client.get(parsed.clone()).send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %parsed, "Failed to fetch media");
            return Err(HttpSourceError::Status(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        if !is_playable_content_type(&content_type) {
            return Err(HttpSourceError::UnsupportedContentType(content_type));
        }

        let payload = response.bytes().await?;

        debug!(
            size = payload.len(),
            content_type = %content_type,
            "Fetched media"
        );

        Ok(FetchedMedia {
            payload,
            content_type,
            metadata: None,
        })
    }
}

impl Default for HttpMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn fetch(&self, url: &str) -> media_blob_cache::Result<FetchedMedia> {
        self.load(url).await.map_err(FetchError::from)
    }

    /// The whole body is buffered by `fetch`, so anything non-empty with a
    /// playable type can play through. Playlists must carry the HLS header.
    async fn probe(&self, media: &MediaHandle) -> media_blob_cache::Result<()> {
        if media.payload().is_empty() {
            return Err(FetchError::Unsupported(format!(
                "{} has an empty payload",
                media.url()
            )));
        }

        if !is_playable_content_type(media.content_type()) {
            return Err(HttpSourceError::UnsupportedContentType(media.content_type().into()).into());
        }

        let mime = media.content_type().to_ascii_lowercase();
        if is_hls(mime.split(';').next().unwrap_or_default().trim())
            && !media.payload().starts_with(HLS_MAGIC)
        {
            return Err(FetchError::Unsupported(format!(
                "{} is not an HLS playlist",
                media.url()
            )));
        }

        Ok(())
    }
}
