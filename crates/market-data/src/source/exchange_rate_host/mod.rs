//! Exchangerate.host source for daily fiat exchange rates.
//!
//! Serves the fully-connected fiat layer of the conversion graph. Rates
//! are daily, so the whole day shares one flat bar.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::MarketDataError;
use crate::models::{BarGranularity, HistoricalBar};
use crate::source::{PriceSource, RateLimit};

const SOURCE_ID: &str = "Exchangerate.host";

/// Fiat currencies the API quotes. Pairs outside this set are rejected
/// structurally so crypto lookups never reach the network.
const SUPPORTED_FIAT: &[&str] = &[
    "AUD", "CAD", "CHF", "EUR", "GBP", "JPY", "KRW", "NZD", "USD",
];

/// Default HTTP request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RatesResponse {
    success: bool,
    #[serde(default)]
    rates: HashMap<String, Decimal>,
}

/// Daily fiat rate source backed by the exchangerate.host REST API.
pub struct ExchangeRateHostSource {
    client: Client,
    access_key: Option<String>,
}

impl ExchangeRateHostSource {
    pub fn new(access_key: Option<String>) -> Result<Self, MarketDataError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, access_key })
    }

    pub fn is_fiat(code: &str) -> bool {
        SUPPORTED_FIAT.contains(&code)
    }
}

#[async_trait]
impl PriceSource for ExchangeRateHostSource {
    fn id(&self) -> &'static str {
        SOURCE_ID
    }

    fn priority(&self) -> u8 {
        5
    }

    fn granularity(&self) -> BarGranularity {
        BarGranularity::Daily
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
            burst_capacity: 10.0,
            min_delay: Duration::from_millis(100),
        }
    }

    fn supports_pair(&self, base: &str, quote: &str) -> bool {
        Self::is_fiat(base) && Self::is_fiat(quote)
    }

    async fn fetch_bar(
        &self,
        base: &str,
        quote: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<HistoricalBar>, MarketDataError> {
        if !self.supports_pair(base, quote) {
            return Err(MarketDataError::PairNotSupported {
                source: SOURCE_ID.to_string(),
                base: base.to_string(),
                quote: quote.to_string(),
            });
        }

        let day = at.format("%Y-%m-%d").to_string();
        let mut url = format!(
            "https://api.exchangerate.host/{}?base={}&symbols={}",
            day, base, quote
        );
        if let Some(key) = &self.access_key {
            url.push_str(&format!("&access_key={}", key));
        }

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                MarketDataError::Timeout {
                    source: SOURCE_ID.to_string(),
                }
            } else {
                MarketDataError::Network(e)
            }
        })?;

        if response.status().as_u16() == 429 {
            return Err(MarketDataError::RateLimited {
                source: SOURCE_ID.to_string(),
            });
        }

        let rates: RatesResponse =
            response
                .json()
                .await
                .map_err(|e| MarketDataError::SourceError {
                    source: SOURCE_ID.to_string(),
                    message: e.to_string(),
                })?;

        if !rates.success {
            return Err(MarketDataError::SourceError {
                source: SOURCE_ID.to_string(),
                message: format!("unsuccessful response for {}/{} on {}", base, quote, day),
            });
        }

        let rate = match rates.rates.get(quote) {
            Some(rate) => *rate,
            None => return Ok(None),
        };

        let start = BarGranularity::Daily.floor(at);
        let end = start + BarGranularity::Daily.span();
        log::debug!("Fetched fiat rate {}/{} on {}: {}", base, quote, day, rate);
        Ok(Some(HistoricalBar::flat(start, end, rate)))
    }
}
