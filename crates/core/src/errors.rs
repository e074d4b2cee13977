use chrono::{DateTime, Utc};
use thiserror::Error;

use taxfolio_market_data::MarketDataError;

pub type Result<T> = std::result::Result<T, Error>;

/// Structural problem in a single record at construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing mandatory field '{field}' on {record}")]
    MissingField { field: &'static str, record: String },

    #[error("Negative amount in field '{field}' on {record}")]
    NegativeAmount { field: &'static str, record: String },

    #[error("crypto_fee and fiat_fee are mutually exclusive on {record}")]
    ConflictingFees { record: String },

    #[error("Invalid transaction type '{value}': {detail}")]
    InvalidTransactionType { value: String, detail: &'static str },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Records sharing a correlation key cannot be merged safely. Fatal for
    /// the run; the user must fix the source data or add a hint.
    #[error("Cannot merge records with unique_id '{unique_id}': {detail}")]
    AmbiguousMerge { unique_id: String, detail: String },

    #[error("Invalid hint for unique_id '{unique_id}': {detail}")]
    InvalidHint { unique_id: String, detail: String },

    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Cache error: {0}")]
    Cache(String),
}

/// Non-fatal resolution gap surfaced alongside the ledger.
///
/// The field stays `unknown` in the emitted record; the user can supply the
/// value manually in a later run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    UnresolvedSpotPrice {
        asset: String,
        timestamp: DateTime<Utc>,
        unique_id: String,
        detail: String,
    },
    UnconvertedFiat {
        from_currency: String,
        to_currency: String,
        timestamp: DateTime<Utc>,
        unique_id: String,
        detail: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnresolvedSpotPrice {
                asset,
                timestamp,
                unique_id,
                detail,
            } => write!(
                f,
                "Could not resolve spot price for {} at {} (unique_id {}): {}",
                asset, timestamp, unique_id, detail
            ),
            Warning::UnconvertedFiat {
                from_currency,
                to_currency,
                timestamp,
                unique_id,
                detail,
            } => write!(
                f,
                "Could not convert {} to {} at {} (unique_id {}): {}",
                from_currency, to_currency, timestamp, unique_id, detail
            ),
        }
    }
}
