//! Manually supplied price bars.
//!
//! Backs user-authored price data and is the building block for tests:
//! bars are registered up front and served from memory, no network
//! involved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::errors::MarketDataError;
use crate::models::{BarGranularity, HistoricalBar};
use crate::source::{PriceSource, RateLimit};

const SOURCE_ID: &str = "Manual";

/// In-memory price source fed by the caller.
pub struct ManualSource {
    /// Pair -> bars ordered by window start.
    bars: RwLock<HashMap<(String, String), BTreeMap<DateTime<Utc>, HistoricalBar>>>,
    granularity: BarGranularity,
}

impl ManualSource {
    pub fn new() -> Self {
        Self {
            bars: RwLock::new(HashMap::new()),
            granularity: BarGranularity::Minute,
        }
    }

    pub fn with_granularity(granularity: BarGranularity) -> Self {
        Self {
            bars: RwLock::new(HashMap::new()),
            granularity,
        }
    }

    /// Registers a bar for a pair. Later registrations for the same window
    /// replace earlier ones.
    pub fn add_bar(&self, base: &str, quote: &str, bar: HistoricalBar) {
        let mut bars = self
            .bars
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        bars.entry((base.to_string(), quote.to_string()))
            .or_default()
            .insert(bar.start, bar);
    }
}

impl Default for ManualSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for ManualSource {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    fn priority(&self) -> u8 {
        1
    }

    fn granularity(&self) -> BarGranularity {
        self.granularity
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: u32::MAX,
            burst_capacity: f64::MAX,
            min_delay: std::time::Duration::ZERO,
        }
    }

    fn supports_pair(&self, base: &str, quote: &str) -> bool {
        let bars = self
            .bars
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        bars.contains_key(&(base.to_string(), quote.to_string()))
    }

    async fn fetch_bar(
        &self,
        base: &str,
        quote: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<HistoricalBar>, MarketDataError> {
        let bars = self
            .bars
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let history = match bars.get(&(base.to_string(), quote.to_string())) {
            Some(h) => h,
            None => {
                return Err(MarketDataError::PairNotSupported {
                    source: SOURCE_ID.to_string(),
                    base: base.to_string(),
                    quote: quote.to_string(),
                })
            }
        };

        // Last bar starting on or before the lookup instant, provided its
        // window actually covers it.
        let candidate = history.range(..=at).next_back().map(|(_, bar)| bar);
        match candidate {
            Some(bar) if bar.end > at => Ok(Some(bar.clone())),
            _ => Ok(None),
        }
    }
}
