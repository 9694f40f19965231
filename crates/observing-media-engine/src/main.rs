//! Feed warm-up tool
//!
//! Warms the first screen of a video feed through the media engine and
//! prints the resulting cache statistics as JSON. Feed URLs are passed as
//! arguments; everything else comes from the environment.

use http_media_source::HttpMediaSource;
use observing_media_engine::{EngineConfig, EngineError, MediaEngine, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

const IDLE_POLL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::from_default_env().add_directive("observing_media_engine=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    let feed: Vec<String> = std::env::args().skip(1).collect();
    let first = feed
        .first()
        .cloned()
        .ok_or_else(|| EngineError::Config("usage: feed-warmup <url>...".to_string()))?;

    let config = EngineConfig::from_env();
    info!(
        "Max cache size: {} MB",
        config.byte_budget / (1024 * 1024)
    );
    info!("Feed items: {}", feed.len());

    let engine = MediaEngine::new(config, Arc::new(HttpMediaSource::new()));
    let tasks = engine.start()?;

    match engine.scheduler().ensure_warm(&first).await {
        Ok(media) => info!(
            url = %media.url(),
            size = media.media().byte_size(),
            "First item ready to play"
        ),
        Err(e) => warn!(url = %first, error = %e, "First item failed to warm"),
    }

    engine.scheduler().preload_nearby(0, &feed).await;
    while !engine.scheduler().is_idle().await {
        tokio::time::sleep(IDLE_POLL).await;
    }

    let warm = engine.scheduler().warm_urls().await;
    info!("Warm items: {}", warm.len());

    let stats = engine.cache().stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    tasks.shutdown().await;
    Ok(())
}
