use serde::Deserialize;

use taxfolio_market_data::PriceSelection;

/// Fiat currencies tried, in order, when crossing from a crypto market
/// into the fiat layer.
pub const DEFAULT_FIAT_PRIORITY: [&str; 8] =
    ["USD", "EUR", "JPY", "KRW", "GBP", "CAD", "AUD", "CHF"];

pub const DEFAULT_EXCHANGE: &str = "Kraken";

/// Run configuration for the resolver and the price router.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// The tax jurisdiction's reporting currency.
    pub native_fiat: String,
    /// Ordered fiat candidates for routing; first reachable wins.
    pub fiat_priority: Vec<String>,
    /// Which scalar to pick from a historical bar.
    pub price_selection: PriceSelection,
    /// Exchange whose markets are used when a record has no exchange
    /// context of its own.
    pub default_exchange: String,
    /// When false, records with an unknown spot price are passed through
    /// without querying any price source.
    pub resolve_missing_prices: bool,
    /// Preferred price source ids, tried in order before the remaining
    /// registered sources.
    pub source_priority: Vec<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            native_fiat: "USD".to_string(),
            fiat_priority: DEFAULT_FIAT_PRIORITY.iter().map(|s| s.to_string()).collect(),
            price_selection: PriceSelection::default(),
            default_exchange: DEFAULT_EXCHANGE.to_string(),
            resolve_missing_prices: true,
            source_priority: Vec::new(),
        }
    }
}

impl ResolverSettings {
    /// Fiat candidates with the native fiat guaranteed a slot.
    pub fn fiat_candidates(&self) -> Vec<String> {
        let mut candidates = self.fiat_priority.clone();
        if !candidates.iter().any(|c| c == &self.native_fiat) {
            candidates.push(self.native_fiat.clone());
        }
        candidates
    }
}
