//! Price source abstractions and implementations.
//!
//! This module contains:
//! - The `PriceSource` trait that all historical price sources implement
//! - Concrete implementations (manual data, exchangerate.host fiat rates)
//!
//! Sources answer one question: "what did one unit of `base` cost in
//! `quote` at this instant, per your own market data?" Pair routing
//! across sources lives in the caller, not in the sources themselves.

mod traits;

pub mod exchange_rate_host;
pub mod manual;

pub use exchange_rate_host::ExchangeRateHostSource;
pub use manual::ManualSource;
pub use traits::{PriceSource, RateLimit};
