//! Price source trait definitions.
//!
//! This module defines the core `PriceSource` trait that all historical
//! price sources must implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::errors::MarketDataError;
use crate::models::{BarGranularity, HistoricalBar};

/// Rate limiting configuration declared by a source.
#[derive(Clone, Copy, Debug)]
pub struct RateLimit {
    /// Maximum requests per minute.
    pub requests_per_minute: u32,
    /// Burst capacity of the token bucket.
    pub burst_capacity: f64,
    /// Minimum delay between requests.
    pub min_delay: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_capacity: 10.0,
            min_delay: Duration::ZERO,
        }
    }
}

/// Trait for historical price sources.
///
/// Implement this trait to add support for a new exchange or fiat rate
/// table. The registry uses the source's declared pair support and
/// priority to determine when and how to query it.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Unique identifier for this source, e.g. "Kraken" or
    /// "Exchangerate.host". Used for cache keys, rate limiting and logging.
    fn id(&self) -> &'static str;

    /// Source priority for ordering. Lower values = higher priority.
    fn priority(&self) -> u8 {
        10
    }

    /// Native bar granularity; lookup timestamps are floored to this
    /// bucket for caching.
    fn granularity(&self) -> BarGranularity {
        BarGranularity::Minute
    }

    /// Rate limits that should be applied when calling this source.
    fn rate_limit(&self) -> RateLimit {
        RateLimit::default()
    }

    /// Whether the source lists a market for the pair. A cheap structural
    /// check; the fetch itself may still return no data for a window.
    fn supports_pair(&self, base: &str, quote: &str) -> bool;

    /// Fetch the bar whose window contains `at` for the given pair.
    ///
    /// Returns `Ok(None)` when the source carries the pair but has no bar
    /// for the window; callers treat this as "try the next source."
    async fn fetch_bar(
        &self,
        base: &str,
        quote: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<HistoricalBar>, MarketDataError>;
}
