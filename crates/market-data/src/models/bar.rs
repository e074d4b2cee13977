use chrono::{DateTime, Duration, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single bar of historical market data covering one time window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    /// Start of the window the bar summarizes (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl HistoricalBar {
    /// A constant-rate bar, used for aliases and same-asset conversions.
    pub fn flat(start: DateTime<Utc>, end: DateTime<Utc>, rate: Decimal) -> Self {
        Self {
            start,
            end,
            open: rate,
            high: rate,
            low: rate,
            close: rate,
        }
    }

    /// Selects one scalar price from the bar per the configured policy.
    ///
    /// `Nearest` picks the open or close depending on which window boundary
    /// is temporally closer to the transaction timestamp.
    pub fn price(&self, at: DateTime<Utc>, selection: PriceSelection) -> Decimal {
        match selection {
            PriceSelection::Open => self.open,
            PriceSelection::High => self.high,
            PriceSelection::Low => self.low,
            PriceSelection::Close => self.close,
            PriceSelection::Nearest => {
                let to_start = (at - self.start).abs();
                let to_end = (at - self.end).abs();
                if to_start < to_end {
                    self.open
                } else {
                    self.close
                }
            }
        }
    }
}

/// Which scalar of a [`HistoricalBar`] approximates the point-in-time price.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSelection {
    Open,
    #[default]
    High,
    Low,
    Close,
    Nearest,
}

/// Native bar granularity of a price source. Determines how lookup
/// timestamps are bucketed for caching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarGranularity {
    Minute,
    Daily,
}

impl BarGranularity {
    /// Floors a timestamp to the start of its bucket.
    pub fn floor(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let truncated = at
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(at);
        match self {
            BarGranularity::Minute => truncated,
            BarGranularity::Daily => truncated.with_minute(0).and_then(|t| t.with_hour(0)).unwrap_or(truncated),
        }
    }

    /// Length of one bucket.
    pub fn span(&self) -> Duration {
        match self {
            BarGranularity::Minute => Duration::minutes(1),
            BarGranularity::Daily => Duration::days(1),
        }
    }
}
