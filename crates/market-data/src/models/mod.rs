//! Data models for historical price lookups.

mod bar;

pub use bar::{BarGranularity, HistoricalBar, PriceSelection};
