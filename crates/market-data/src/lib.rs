//! Historical market data for crypto and fiat pairs.
//!
//! This crate provides the bar cache, rate-limited source registry and
//! bounded fetch pool used to price transactions after the fact. Sources
//! implement the [`PriceSource`] trait; the [`SourceRegistry`] picks among
//! them, serving from the persistent [`BarCache`] whenever possible.

pub mod cache;
pub mod errors;
pub mod models;
pub mod registry;
pub mod source;

pub use cache::{BarCache, BarKey};
pub use errors::{MarketDataError, RetryClass};
pub use models::{BarGranularity, HistoricalBar, PriceSelection};
pub use registry::{FetchPool, RateLimiter, RetryPolicy, SourceRegistry, DEFAULT_MAX_IN_FLIGHT};
pub use source::{ExchangeRateHostSource, ManualSource, PriceSource, RateLimit};
