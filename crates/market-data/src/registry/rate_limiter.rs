//! Token bucket rate limiter for price sources.
//!
//! Each source gets its own bucket sized from the limits the source
//! declares via `PriceSource::rate_limit`. Buckets refill continuously;
//! `acquire` waits (asynchronously) until a token is available.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::source::RateLimit;

/// Token bucket for a single source.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of available tokens.
    tokens: f64,
    /// Last time the bucket was updated.
    last_update: Instant,
    /// Token refill rate (tokens per second).
    rate: f64,
    /// Maximum bucket capacity.
    capacity: f64,
}

impl TokenBucket {
    fn from_limit(limit: RateLimit) -> Self {
        // A declared throughput or capacity of zero would make every wait
        // infinite (and `Duration::from_secs_f64` panic on it); floor both
        // so such a source is throttled to one request per minute instead.
        let capacity = limit.burst_capacity.max(1.0);
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: (f64::from(limit.requests_per_minute) / 60.0).max(1.0 / 60.0),
            capacity,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Duration::from_secs_f64(tokens_needed / self.rate)
        }
    }
}

/// Rate limiter shared by all fetch workers.
pub struct RateLimiter {
    /// Per-source token buckets.
    buckets: Mutex<HashMap<String, TokenBucket>>,
    /// Per-source declared limits; buckets are created lazily from these.
    limits: Mutex<HashMap<String, RateLimit>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            limits: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the buckets mutex, recovering from poison if necessary.
    /// Worst case of recovery is slightly off rate limiting, which beats
    /// panicking.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_limits(&self) -> MutexGuard<'_, HashMap<String, RateLimit>> {
        self.limits.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter limits mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Declares the limits for a source. Resets any existing bucket.
    pub fn configure(&self, source: &str, limit: RateLimit) {
        let mut limits = self.lock_limits();
        limits.insert(source.to_string(), limit);
        drop(limits);

        let mut buckets = self.lock_buckets();
        buckets.remove(source);
    }

    /// Acquire a token for the given source, waiting as long as needed.
    pub async fn acquire(&self, source: &str) {
        let min_delay = {
            let limits = self.lock_limits();
            limits.get(source).map(|l| l.min_delay).unwrap_or_default()
        };

        loop {
            let wait_time = {
                let mut buckets = self.lock_buckets();

                let bucket = buckets
                    .entry(source.to_string())
                    .or_insert_with(|| self.create_bucket(source));

                if bucket.try_acquire() {
                    debug!("Rate limiter: acquired token for '{}'", source);
                    break;
                }

                bucket.time_until_available()
            };

            if wait_time > Duration::ZERO {
                debug!("Rate limiter: waiting {:?} for source '{}'", wait_time, source);
                tokio::time::sleep(wait_time).await;
            }
        }

        if min_delay > Duration::ZERO {
            tokio::time::sleep(min_delay).await;
        }
    }

    /// Try to acquire a token without waiting.
    pub fn try_acquire(&self, source: &str) -> bool {
        let mut buckets = self.lock_buckets();

        let bucket = buckets
            .entry(source.to_string())
            .or_insert_with(|| self.create_bucket(source));

        bucket.try_acquire()
    }

    fn create_bucket(&self, source: &str) -> TokenBucket {
        let limits = self.lock_limits();
        let limit = limits.get(source).copied().unwrap_or_default();
        TokenBucket::from_limit(limit)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
