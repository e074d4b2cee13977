use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use thiserror::Error;

use taxfolio_market_data::{
    BarCache, MarketDataError, PriceSelection, PriceSource, SourceRegistry,
};

use super::graph::{ConversionHop, HopSource, PriceGraph, PriceGraphBuilder};
use crate::settings::ResolverSettings;

/// Why a conversion could not be computed. Callers downgrade this to a
/// warning; an unroutable price is a gap, not a run failure.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("No conversion path from {base} to {quote}")]
    NoPath { base: String, quote: String },

    #[error("Market reported a zero rate for {base}/{quote}")]
    ZeroRate { base: String, quote: String },

    #[error(transparent)]
    MarketData(#[from] MarketDataError),
}

/// Computes composite conversion rates over the price graph.
///
/// Path finding is pure graph work; each hop is then priced through the
/// source registry, which serves cached bars without touching the network.
pub struct PriceRouter {
    graph: PriceGraph,
    registry: Arc<SourceRegistry>,
    selection: PriceSelection,
    default_exchange: String,
}

impl PriceRouter {
    pub fn new(
        graph: PriceGraph,
        registry: Arc<SourceRegistry>,
        selection: PriceSelection,
        default_exchange: String,
    ) -> Self {
        Self {
            graph,
            registry,
            selection,
            default_exchange,
        }
    }

    /// Assembles graph, registry and router from one settings value, so
    /// the fiat priority, price selection, default exchange and source
    /// order cannot drift apart.
    ///
    /// The builder carries the run's markets and aliases; the fiat layer
    /// is wired in here from the settings.
    pub fn from_settings(
        builder: PriceGraphBuilder,
        sources: Vec<Arc<dyn PriceSource>>,
        cache: Arc<BarCache>,
        settings: &ResolverSettings,
    ) -> Self {
        let mut registry = SourceRegistry::new(sources, cache);
        if !settings.source_priority.is_empty() {
            registry = registry.with_priority_order(&settings.source_priority);
        }
        let graph = builder.build(&settings.fiat_candidates());
        Self::new(
            graph,
            Arc::new(registry),
            settings.price_selection,
            settings.default_exchange.clone(),
        )
    }

    /// End-to-end rate such that `amount_base * rate = amount_quote` at
    /// time `at`. Deterministic for identical inputs over an identical bar
    /// dataset.
    pub async fn convert(
        &self,
        base: &str,
        quote: &str,
        at: DateTime<Utc>,
        exchange_context: Option<&str>,
    ) -> Result<Decimal, RouteError> {
        if base == quote {
            return Ok(Decimal::ONE);
        }

        let path = self
            .graph
            .find_path(base, quote)
            .ok_or_else(|| RouteError::NoPath {
                base: base.to_string(),
                quote: quote.to_string(),
            })?;

        debug!(
            "Converting {} to {} at {} over {} hop(s)",
            base,
            quote,
            at,
            path.len()
        );

        let mut rate = Decimal::ONE;
        for hop in &path {
            rate *= self.hop_rate(hop, at, exchange_context).await?;
        }
        Ok(rate)
    }

    async fn hop_rate(
        &self,
        hop: &ConversionHop,
        at: DateTime<Utc>,
        exchange_context: Option<&str>,
    ) -> Result<Decimal, RouteError> {
        match &hop.via {
            HopSource::Alias { factor } => Ok(*factor),
            HopSource::FiatRate => {
                let bar = self.registry.get_bar(&hop.base, &hop.quote, at, None).await?;
                Ok(bar.price(at, self.selection))
            }
            HopSource::Market { exchanges, inverted } => {
                let exchange = self.pick_exchange(exchanges, exchange_context);
                // Query the pair the way the market lists it.
                let (pair_base, pair_quote) = if *inverted {
                    (hop.quote.as_str(), hop.base.as_str())
                } else {
                    (hop.base.as_str(), hop.quote.as_str())
                };
                let bar = self
                    .registry
                    .get_bar(pair_base, pair_quote, at, Some(exchange))
                    .await?;
                let price = bar.price(at, self.selection);
                if *inverted {
                    if price.is_zero() {
                        return Err(RouteError::ZeroRate {
                            base: hop.base.clone(),
                            quote: hop.quote.clone(),
                        });
                    }
                    Ok(Decimal::ONE / price)
                } else {
                    Ok(price)
                }
            }
        }
    }

    /// The record's own exchange wins when it lists the pair, then the
    /// configured default, then whichever exchange listed the pair first.
    fn pick_exchange<'a>(
        &'a self,
        exchanges: &'a [String],
        exchange_context: Option<&'a str>,
    ) -> &'a str {
        if let Some(context) = exchange_context {
            if exchanges.iter().any(|e| e == context) {
                return context;
            }
        }
        if exchanges.iter().any(|e| e == &self.default_exchange) {
            return &self.default_exchange;
        }
        exchanges
            .first()
            .map(String::as_str)
            .unwrap_or(&self.default_exchange)
    }
}
