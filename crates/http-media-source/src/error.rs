//! Error types for the HTTP media source

use media_blob_cache::FetchError;
use std::fmt;

#[derive(Debug)]
pub enum HttpSourceError {
    Http(Box<reqwest::Error>),
    Status(u16),
    InvalidUrl(String),
    UnsupportedContentType(String),
}

impl fmt::Display for HttpSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpSourceError::Http(err) => write!(f, "HTTP error: {}", err),
            HttpSourceError::Status(code) => write!(f, "Server returned status {}", code),
            HttpSourceError::InvalidUrl(msg) => write!(f, "Invalid media URL: {}", msg),
            HttpSourceError::UnsupportedContentType(ct) => {
                write!(f, "Unsupported content type: {}", ct)
            }
        }
    }
}

impl std::error::Error for HttpSourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpSourceError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for HttpSourceError {
    fn from(err: reqwest::Error) -> Self {
        HttpSourceError::Http(Box::new(err))
    }
}

impl From<HttpSourceError> for FetchError {
    fn from(err: HttpSourceError) -> Self {
        match err {
            HttpSourceError::Http(ref e) if e.is_timeout() => FetchError::Timeout,
            HttpSourceError::Http(_) | HttpSourceError::Status(_) => {
                FetchError::NetworkFailure(err.to_string())
            }
            HttpSourceError::InvalidUrl(_) | HttpSourceError::UnsupportedContentType(_) => {
                FetchError::Unsupported(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, HttpSourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = HttpSourceError::Status(404);
        assert_eq!(format!("{}", err), "Server returned status 404");
    }

    #[test]
    fn test_status_maps_to_network_failure() {
        let err: FetchError = HttpSourceError::Status(503).into();
        assert_eq!(
            err,
            FetchError::NetworkFailure("Server returned status 503".to_string())
        );
    }

    #[test]
    fn test_content_type_maps_to_unsupported() {
        let err: FetchError = HttpSourceError::UnsupportedContentType("text/html".into()).into();
        assert!(matches!(err, FetchError::Unsupported(_)));
    }

    #[test]
    fn test_error_is_debug() {
        let err = HttpSourceError::InvalidUrl("ftp://x".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("InvalidUrl"));
    }
}
