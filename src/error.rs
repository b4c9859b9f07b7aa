//! Error types shared by the library modules

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while fetching, enriching or storing feeds
#[derive(Debug, Error)]
pub enum NewsError {
    /// HTTP request failed before a response arrived
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Upstream returned a non-success status
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Persistent storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A required setting (usually an API key) is absent
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Every category and the global fallback came back empty-handed
    #[error("Unable to load news right now. Pull to refresh and try again.")]
    Unavailable,
}

pub type NewsResult<T> = Result<T, NewsError>;

impl From<sqlx::Error> for NewsError {
    fn from(err: sqlx::Error) -> Self {
        NewsError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for NewsError {
    fn from(err: serde_json::Error) -> Self {
        NewsError::Parse(err.to_string())
    }
}
