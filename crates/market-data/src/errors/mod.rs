//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all price lookup operations
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use std::fmt;

/// Errors that can occur while fetching historical price bars.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which determines how the
/// source registry should handle the error.
///
/// `Display`, `Error`, and `From<reqwest::Error>` are implemented by hand
/// because the `source` fields hold a source *name* (e.g. "Kraken"), not an
/// error cause, which `#[derive(thiserror::Error)]` cannot express.
#[derive(Debug)]
pub enum MarketDataError {
    /// The source does not list a market for the requested pair.
    /// Terminal for this source, but another source may carry the pair.
    PairNotSupported {
        source: String,
        base: String,
        quote: String,
    },

    /// The pair exists but the source has no bar covering the window.
    NoDataForWindow { source: String },

    /// The source rate limited the request (HTTP 429).
    /// Retried with exponential backoff.
    RateLimited { source: String },

    /// The request to the source timed out.
    /// Retried with exponential backoff.
    Timeout { source: String },

    /// A source-specific error occurred. Try the next source.
    SourceError { source: String, message: String },

    /// No sources are registered that can answer the request.
    NoSourcesAvailable,

    /// All candidate sources were tried and all failed.
    AllSourcesFailed,

    /// Failed to read or write the persistent bar cache.
    CacheStore(String),

    /// A network error occurred while communicating with a source.
    Network(reqwest::Error),
}

impl fmt::Display for MarketDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PairNotSupported {
                source,
                base,
                quote,
            } => write!(f, "Pair {base}/{quote} not supported by source {source}"),
            Self::NoDataForWindow { source } => {
                write!(f, "No bar for requested window: {source}")
            }
            Self::RateLimited { source } => write!(f, "Rate limited: {source}"),
            Self::Timeout { source } => write!(f, "Timeout: {source}"),
            Self::SourceError { source, message } => {
                write!(f, "Source error: {source} - {message}")
            }
            Self::NoSourcesAvailable => write!(f, "No sources available"),
            Self::AllSourcesFailed => write!(f, "All sources failed"),
            Self::CacheStore(msg) => write!(f, "Cache store error: {msg}"),
            Self::Network(err) => write!(f, "Network error: {err}"),
        }
    }
}

impl std::error::Error for MarketDataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Network(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err)
    }
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Transient errors - retry the same source with backoff
            Self::RateLimited { .. } | Self::Timeout { .. } => RetryClass::WithBackoff,

            // Source-specific failures - try the next source
            Self::PairNotSupported { .. }
            | Self::NoDataForWindow { .. }
            | Self::SourceError { .. } => RetryClass::NextSource,

            // Terminal - don't retry anywhere
            Self::NoSourcesAvailable
            | Self::AllSourcesFailed
            | Self::CacheStore(_)
            | Self::Network(_) => RetryClass::Never,
        }
    }
}
