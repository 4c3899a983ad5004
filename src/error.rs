// src/error.rs

//! Unified error handling for the crawler application.
//!
//! Three layers of errors exist:
//! - [`ScraperError`]: a single scraper call failed. Isolated and tallied.
//! - [`StoreError`]: the event store refused or failed an operation.
//! - [`AppError`]: everything surfaced to callers of the library.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for event store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Every scraper call of a run failed
    #[error("All {calls} scraper call(s) failed")]
    AllScrapersFailed { calls: usize },

    /// Event store failed after retries
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Failure of a single `fetch_events` call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScraperError {
    /// Transport failure or unexpected HTTP status
    #[error("network error: {0}")]
    Network(String),

    /// The platform refused us (403/429 or a bot wall)
    #[error("blocked by platform (HTTP {status})")]
    Blocked { status: u16 },

    /// The call exceeded the collector's per-call timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The page was fetched but could not be understood
    #[error("parse error: {0}")]
    Parse(String),
}

impl ScraperError {
    /// Whether a configured demo fallback may stand in for this failure.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Blocked { .. })
    }
}

impl From<reqwest::Error> for ScraperError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 403 || status.as_u16() == 429 => Self::Blocked {
                status: status.as_u16(),
            },
            _ => Self::Network(err.to_string()),
        }
    }
}

/// Failure reported by an [`EventStore`](crate::storage::EventStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Write ceiling hit; the store asks us to wait
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Store is unreachable or failed transiently
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Persisted data could not be decoded
    #[error("corrupt store data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Create an unavailable error.
    pub fn unavailable(message: impl fmt::Display) -> Self {
        Self::Unavailable(message.to_string())
    }

    /// Whether retrying the same operation can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}
