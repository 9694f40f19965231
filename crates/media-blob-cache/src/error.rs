//! Error types for the media blob cache

use std::fmt;

/// Why a resource could not be acquired.
///
/// Cloneable so a single coalesced fetch can hand the same result to
/// every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    NetworkFailure(String),
    Timeout,
    Unsupported(String),
    /// The request was withdrawn while its fetch was in flight.
    Cancelled,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::NetworkFailure(msg) => write!(f, "Network failure: {}", msg),
            FetchError::Timeout => write!(f, "Fetch timed out"),
            FetchError::Unsupported(msg) => write!(f, "Unsupported media: {}", msg),
            FetchError::Cancelled => write!(f, "Fetch cancelled"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<tokio::time::error::Elapsed> for FetchError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        FetchError::Timeout
    }
}

/// Errors from explicit cache insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    ItemTooLarge { size: u64, budget: u64 },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::ItemTooLarge { size, budget } => write!(
                f,
                "Item of {} bytes exceeds cache budget of {} bytes",
                size, budget
            ),
        }
    }
}

impl std::error::Error for CacheError {}

pub type Result<T> = std::result::Result<T, FetchError>;
