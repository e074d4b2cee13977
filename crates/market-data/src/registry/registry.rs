//! Source registry orchestrating historical bar lookups.
//!
//! The registry manages multiple price sources, handling:
//! - Source selection based on pair support and preference
//! - The persistent bar cache (checked before any network call)
//! - Rate limiting, bounded retry with backoff, and failover

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;

use super::RateLimiter;
use crate::cache::{BarCache, BarKey};
use crate::errors::{MarketDataError, RetryClass};
use crate::models::HistoricalBar;
use crate::source::PriceSource;

/// Bounded retry configuration for transient failures.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Attempts per source, including the first.
    pub max_attempts: u32,
    /// Backoff before attempt n+1 is `base_delay * 2^n` plus jitter.
    pub base_delay: Duration,
    /// Upper bound on any single backoff sleep.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=exp.as_millis().min(250) as u64);
        exp + Duration::from_millis(jitter_ms)
    }
}

/// Registry of price sources with caching, rate limiting and failover.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn PriceSource>>,
    rate_limiter: RateLimiter,
    cache: Arc<BarCache>,
    retry: RetryPolicy,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, cache: Arc<BarCache>) -> Self {
        Self::with_retry_policy(sources, cache, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        mut sources: Vec<Arc<dyn PriceSource>>,
        cache: Arc<BarCache>,
        retry: RetryPolicy,
    ) -> Self {
        // Stable sort keeps registration order among equal priorities.
        sources.sort_by_key(|source| source.priority());
        let rate_limiter = RateLimiter::new();
        for source in &sources {
            rate_limiter.configure(source.id(), source.rate_limit());
        }
        Self {
            sources,
            rate_limiter,
            cache,
            retry,
        }
    }

    /// Reorders sources so the listed ids come first, in the given order.
    /// Ids not present in the registry are ignored.
    pub fn with_priority_order(mut self, order: &[String]) -> Self {
        let rank = |id: &str| {
            order
                .iter()
                .position(|candidate| candidate == id)
                .unwrap_or(order.len())
        };
        self.sources
            .sort_by_key(|source| (rank(source.id()), source.priority()));
        self
    }

    pub fn cache(&self) -> &Arc<BarCache> {
        &self.cache
    }

    /// Fetch the bar covering `at` for a pair.
    ///
    /// Tries sources in order:
    /// 1. Filter to sources that list the pair
    /// 2. Preferred source (the transaction's originating exchange) first,
    ///    then by declared priority
    /// 3. Serve from cache when the bucket is already known
    /// 4. Rate limit, fetch, retry transient failures with backoff
    /// 5. On a terminal miss, fail over to the next source
    pub async fn get_bar(
        &self,
        base: &str,
        quote: &str,
        at: DateTime<Utc>,
        preferred: Option<&str>,
    ) -> Result<HistoricalBar, MarketDataError> {
        let candidates = self.ordered_sources(base, quote, preferred);

        if candidates.is_empty() {
            warn!("No sources list pair {}/{}", base, quote);
            return Err(MarketDataError::NoSourcesAvailable);
        }

        let mut last_error: Option<MarketDataError> = None;

        for source in candidates {
            let key = BarKey::new(source.id(), base, quote, at, source.granularity());

            if let Some(bar) = self.cache.get(&key) {
                debug!(
                    "Cache hit for {}/{} at {} on '{}'",
                    base, quote, key.bucket, source.id()
                );
                return Ok(bar);
            }

            match self.fetch_with_retry(source.as_ref(), base, quote, at).await {
                Ok(Some(bar)) => {
                    let bar = self.cache.insert_if_absent(key, bar);
                    info!(
                        "Fetched bar for {}/{} at {} from '{}'",
                        base, quote, at, source.id()
                    );
                    return Ok(bar);
                }
                Ok(None) => {
                    debug!(
                        "Source '{}' has no bar for {}/{} at {}, trying next",
                        source.id(),
                        base,
                        quote,
                        at
                    );
                    last_error = Some(MarketDataError::NoDataForWindow {
                        source: source.id().to_string(),
                    });
                }
                Err(error) => {
                    if error.retry_class() == RetryClass::Never {
                        return Err(error);
                    }
                    warn!(
                        "Source '{}' failed for {}/{}: {}, trying next",
                        source.id(),
                        base,
                        quote,
                        error
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or(MarketDataError::AllSourcesFailed))
    }

    /// One source's fetch with bounded backoff on transient errors.
    async fn fetch_with_retry(
        &self,
        source: &dyn PriceSource,
        base: &str,
        quote: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<HistoricalBar>, MarketDataError> {
        let mut attempt = 0u32;
        loop {
            self.rate_limiter.acquire(source.id()).await;

            match source.fetch_bar(base, quote, at).await {
                Ok(result) => return Ok(result),
                Err(error) => match error.retry_class() {
                    RetryClass::WithBackoff if attempt + 1 < self.retry.max_attempts => {
                        let delay = self.retry.backoff(attempt);
                        warn!(
                            "Transient failure from '{}' ({}), retrying in {:?} (attempt {}/{})",
                            source.id(),
                            error,
                            delay,
                            attempt + 1,
                            self.retry.max_attempts
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    _ => return Err(error),
                },
            }
        }
    }

    fn ordered_sources(
        &self,
        base: &str,
        quote: &str,
        preferred: Option<&str>,
    ) -> Vec<Arc<dyn PriceSource>> {
        let mut candidates: Vec<Arc<dyn PriceSource>> = self
            .sources
            .iter()
            .filter(|source| source.supports_pair(base, quote))
            .cloned()
            .collect();

        // Stable sort keeps the registry's configured order among equals.
        if let Some(preferred) = preferred {
            candidates.sort_by_key(|source| {
                if source.id() == preferred {
                    0i32
                } else {
                    i32::from(source.priority()) + 1
                }
            });
        }

        candidates
    }
}
