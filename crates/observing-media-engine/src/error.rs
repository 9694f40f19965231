//! Error types for the Observ.ing media engine

use media_blob_cache::FetchError;
use std::fmt;

/// Why a playback request did not start playing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// The target reported it cannot play yet; nothing else was paused
    NotReady(String),
    UnderlyingPlayFailed { id: String, reason: String },
    UnknownHandle(String),
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackError::NotReady(id) => write!(f, "Playback target {} is not ready", id),
            PlaybackError::UnderlyingPlayFailed { id, reason } => {
                write!(f, "Playback target {} failed to play: {}", id, reason)
            }
            PlaybackError::UnknownHandle(id) => write!(f, "Unknown playback target {}", id),
        }
    }
}

impl std::error::Error for PlaybackError {}

#[derive(Debug)]
pub enum EngineError {
    Config(String),
    AlreadyStarted,
    Fetch(FetchError),
    Json(Box<serde_json::Error>),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            EngineError::AlreadyStarted => write!(f, "Engine background tasks already started"),
            EngineError::Fetch(err) => write!(f, "Fetch error: {}", err),
            EngineError::Json(err) => write!(f, "JSON error: {}", err),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Fetch(err) => Some(err),
            EngineError::Json(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<FetchError> for EngineError {
    fn from(err: FetchError) -> Self {
        EngineError::Fetch(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Json(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for EngineError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        EngineError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underlying_play_failed_display() {
        let err = PlaybackError::UnderlyingPlayFailed {
            id: "v1".to_string(),
            reason: "autoplay blocked".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Playback target v1 failed to play: autoplay blocked"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = EngineError::Config("missing feed URLs".to_string());
        assert_eq!(format!("{}", err), "Configuration error: missing feed URLs");
    }

    #[test]
    fn test_fetch_error_source() {
        let err = EngineError::from(FetchError::Timeout);
        assert_eq!(format!("{}", err), "Fetch error: Fetch timed out");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_is_debug() {
        let err = EngineError::AlreadyStarted;
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("AlreadyStarted"));
    }
}
