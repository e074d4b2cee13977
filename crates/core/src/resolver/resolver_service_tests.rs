use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use taxfolio_market_data::{
    BarCache, BarGranularity, HistoricalBar, MarketDataError, PriceSelection, PriceSource,
    RateLimit, SourceRegistry,
};

use super::{TransactionHint, TransactionResolver};
use crate::errors::{Error, Warning};
use crate::routing::{PriceGraph, PriceRouter};
use crate::settings::ResolverSettings;
use crate::transactions::{
    InTransaction, InTransactionType, IntraSide, IntraTransaction, OutTransaction,
    OutTransactionType, Transaction, UnknownOr,
};

struct MockMarket {
    id: &'static str,
    rates: HashMap<(String, String), Decimal>,
    fetches: AtomicUsize,
}

impl MockMarket {
    fn new(id: &'static str, pairs: &[(&str, &str, Decimal)]) -> Arc<Self> {
        let rates = pairs
            .iter()
            .map(|(base, quote, rate)| ((base.to_string(), quote.to_string()), *rate))
            .collect();
        Arc::new(Self {
            id,
            rates,
            fetches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PriceSource for MockMarket {
    fn id(&self) -> &'static str {
        self.id
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: u32::MAX,
            burst_capacity: f64::MAX,
            min_delay: Duration::ZERO,
        }
    }

    fn supports_pair(&self, base: &str, quote: &str) -> bool {
        self.rates.contains_key(&(base.to_string(), quote.to_string()))
    }

    async fn fetch_bar(
        &self,
        base: &str,
        quote: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<HistoricalBar>, MarketDataError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let rate = self.rates.get(&(base.to_string(), quote.to_string()));
        Ok(rate.map(|rate| {
            let start = BarGranularity::Minute.floor(at);
            HistoricalBar::flat(start, start + chrono::Duration::minutes(1), *rate)
        }))
    }
}

fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 9, day, hour, 0, 0).unwrap()
}

fn send_half(unique_id: &str, day: u32, hour: u32) -> Transaction {
    Transaction::Intra(IntraTransaction {
        unique_id: UnknownOr::Known(unique_id.to_string()),
        timestamp: ts(day, hour),
        asset: "BTC".to_string(),
        spot_price: UnknownOr::Known(dec!(45000)),
        from: Some(IntraSide {
            exchange: UnknownOr::Known("Coinbase".to_string()),
            holder: UnknownOr::Known("alice".to_string()),
            amount: UnknownOr::Known(dec!(0.5)),
        }),
        to: None,
        notes: None,
    })
}

fn receive_half(unique_id: &str, day: u32, hour: u32) -> Transaction {
    Transaction::Intra(IntraTransaction {
        unique_id: UnknownOr::Known(unique_id.to_string()),
        timestamp: ts(day, hour),
        asset: "BTC".to_string(),
        spot_price: UnknownOr::Unknown,
        from: None,
        to: Some(IntraSide {
            exchange: UnknownOr::Known("Kraken".to_string()),
            holder: UnknownOr::Known("alice".to_string()),
            amount: UnknownOr::Known(dec!(0.499)),
        }),
        notes: None,
    })
}

fn buy(unique_id: &str, day: u32, spot_price: UnknownOr<Decimal>) -> Transaction {
    Transaction::In(InTransaction {
        unique_id: UnknownOr::Known(unique_id.to_string()),
        timestamp: ts(day, 12),
        asset: "BTC".to_string(),
        exchange: "Kraken".to_string(),
        holder: "alice".to_string(),
        transaction_type: UnknownOr::Known(InTransactionType::Buy),
        spot_price,
        crypto_in: dec!(1),
        crypto_fee: None,
        fiat_fee: None,
        fiat_in_no_fee: None,
        fiat_in_with_fee: None,
        fiat_currency: "USD".to_string(),
        notes: None,
    })
}

fn offline_resolver() -> TransactionResolver {
    TransactionResolver::new(ResolverSettings::default(), None)
}

fn priced_resolver(sources: Vec<Arc<dyn PriceSource>>) -> TransactionResolver {
    let settings = ResolverSettings {
        fiat_priority: vec!["USD".to_string(), "EUR".to_string()],
        ..Default::default()
    };
    let mut builder = PriceGraph::builder();
    builder.add_market("Kraken", "BTC", "USD");
    builder.add_market("Kraken", "EUR", "USD");
    let router =
        PriceRouter::from_settings(builder, sources, Arc::new(BarCache::in_memory()), &settings);
    TransactionResolver::new(settings, Some(Arc::new(router)))
}

fn no_hints() -> HashMap<String, TransactionHint> {
    HashMap::new()
}

#[tokio::test]
async fn test_complementary_halves_merge_with_receiving_timestamp() {
    let resolver = offline_resolver();
    let records = vec![send_half("0xaa", 1, 10), receive_half("0xaa", 1, 11)];

    let resolution = resolver.resolve(records, &no_hints()).await.unwrap();
    assert_eq!(resolution.ledger.len(), 1);
    let Transaction::Intra(merged) = &resolution.ledger[0] else {
        panic!("expected a transfer record");
    };
    assert_eq!(merged.timestamp, ts(1, 11));
    let from = merged.from.as_ref().unwrap();
    let to = merged.to.as_ref().unwrap();
    assert_eq!(from.exchange, UnknownOr::Known("Coinbase".to_string()));
    assert_eq!(from.amount, UnknownOr::Known(dec!(0.5)));
    assert_eq!(to.exchange, UnknownOr::Known("Kraken".to_string()));
    assert_eq!(to.amount, UnknownOr::Known(dec!(0.499)));
}

#[tokio::test]
async fn test_non_complementary_pair_is_fatal() {
    let resolver = offline_resolver();
    let records = vec![send_half("0xbb", 1, 10), send_half("0xbb", 1, 11)];

    let error = resolver.resolve(records, &no_hints()).await.unwrap_err();
    assert!(matches!(error, Error::AmbiguousMerge { ref unique_id, .. } if unique_id == "0xbb"));
}

#[tokio::test]
async fn test_more_than_two_records_is_fatal() {
    let resolver = offline_resolver();
    let records = vec![
        send_half("0xcc", 1, 10),
        receive_half("0xcc", 1, 11),
        receive_half("0xcc", 1, 12),
    ];

    let error = resolver.resolve(records, &no_hints()).await.unwrap_err();
    assert!(matches!(error, Error::AmbiguousMerge { ref unique_id, .. } if unique_id == "0xcc"));
}

#[tokio::test]
async fn test_out_in_pair_collapses_to_transfer() {
    // An exchange-reported withdrawal and the destination's deposit with
    // the same chain hash are really one transfer.
    let resolver = offline_resolver();
    let out = Transaction::Out(OutTransaction {
        unique_id: UnknownOr::Known("X".to_string()),
        timestamp: ts(2, 9),
        asset: "BTC".to_string(),
        exchange: "Coinbase".to_string(),
        holder: "alice".to_string(),
        transaction_type: UnknownOr::Unknown,
        spot_price: UnknownOr::Known(dec!(15100)),
        crypto_out_no_fee: dec!(0.5),
        crypto_fee: dec!(0.01),
        crypto_out_with_fee: None,
        fiat_out_no_fee: None,
        fiat_fee: None,
        fiat_currency: "USD".to_string(),
        notes: None,
    });
    let incoming = Transaction::In(InTransaction {
        unique_id: UnknownOr::Known("X".to_string()),
        timestamp: ts(2, 10),
        asset: "BTC".to_string(),
        exchange: "FTX".to_string(),
        holder: "alice".to_string(),
        transaction_type: UnknownOr::Unknown,
        spot_price: UnknownOr::Known(dec!(15100)),
        crypto_in: dec!(0.49),
        crypto_fee: None,
        fiat_fee: None,
        fiat_in_no_fee: None,
        fiat_in_with_fee: None,
        fiat_currency: "USD".to_string(),
        notes: None,
    });

    let resolution = resolver.resolve(vec![out, incoming], &no_hints()).await.unwrap();
    assert_eq!(resolution.ledger.len(), 1);
    let Transaction::Intra(merged) = &resolution.ledger[0] else {
        panic!("expected a transfer record");
    };
    assert_eq!(merged.timestamp, ts(2, 10));
    assert_eq!(merged.spot_price, UnknownOr::Known(dec!(15100)));
    let from = merged.from.as_ref().unwrap();
    let to = merged.to.as_ref().unwrap();
    assert_eq!(from.exchange, UnknownOr::Known("Coinbase".to_string()));
    assert_eq!(from.amount, UnknownOr::Known(dec!(0.5)));
    assert_eq!(to.exchange, UnknownOr::Known("FTX".to_string()));
    assert_eq!(to.amount, UnknownOr::Known(dec!(0.49)));
}

#[tokio::test]
async fn test_resolution_is_idempotent() {
    let resolver = offline_resolver();
    let records = vec![
        send_half("0xdd", 3, 8),
        receive_half("0xdd", 3, 9),
        buy("0xee", 4, UnknownOr::Known(dec!(47000))),
    ];

    let first = resolver.resolve(records, &no_hints()).await.unwrap();
    let second = resolver
        .resolve(first.ledger.clone(), &no_hints())
        .await
        .unwrap();

    assert!(second.warnings.is_empty());
    assert_eq!(format!("{:?}", first.ledger), format!("{:?}", second.ledger));
}

#[tokio::test]
async fn test_hint_recasts_before_grouping() {
    // The withdrawal's counterparty was never reported, so without the
    // hint the out record and the receive half would be a fatal mismatch.
    let resolver = offline_resolver();
    let out = Transaction::Out(OutTransaction {
        unique_id: UnknownOr::Known("0xff".to_string()),
        timestamp: ts(5, 7),
        asset: "BTC".to_string(),
        exchange: "Coinbase".to_string(),
        holder: "alice".to_string(),
        transaction_type: UnknownOr::Known(OutTransactionType::Sell),
        spot_price: UnknownOr::Known(dec!(45000)),
        crypto_out_no_fee: dec!(0.5),
        crypto_fee: dec!(0.001),
        crypto_out_with_fee: None,
        fiat_out_no_fee: None,
        fiat_fee: None,
        fiat_currency: "USD".to_string(),
        notes: None,
    });
    let mut receive = receive_half("0xff", 5, 8);
    if let Transaction::Intra(ref mut r) = receive {
        r.spot_price = UnknownOr::Known(dec!(45000));
    }

    let hints: HashMap<String, TransactionHint> = [(
        "0xff".to_string(),
        TransactionHint::Intra {
            notes: Some("transfer to self".to_string()),
        },
    )]
    .into();

    let resolution = resolver.resolve(vec![out, receive], &hints).await.unwrap();
    assert_eq!(resolution.ledger.len(), 1);
    let Transaction::Intra(merged) = &resolution.ledger[0] else {
        panic!("expected a transfer record");
    };
    assert_eq!(merged.timestamp, ts(5, 8));
    let from = merged.from.as_ref().unwrap();
    assert_eq!(from.exchange, UnknownOr::Known("Coinbase".to_string()));
    assert_eq!(from.amount, UnknownOr::Known(dec!(0.5)));
    assert!(merged.notes.as_deref().unwrap().contains("transfer to self"));
}

#[tokio::test]
async fn test_invalid_hint_direction_is_fatal() {
    let resolver = offline_resolver();
    let hints: HashMap<String, TransactionHint> = [(
        "0xee".to_string(),
        TransactionHint::Out {
            transaction_type: UnknownOr::Known(OutTransactionType::Gift),
            notes: None,
        },
    )]
    .into();

    let error = resolver
        .resolve(vec![buy("0xee", 4, UnknownOr::Known(dec!(1)))], &hints)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidHint { .. }));
}

#[tokio::test]
async fn test_unknown_spot_price_is_backfilled() {
    let kraken = MockMarket::new("Kraken", &[("BTC", "USD", dec!(46500))]);
    let resolver = priced_resolver(vec![kraken]);

    let resolution = resolver
        .resolve(vec![buy("0x01", 6, UnknownOr::Unknown)], &no_hints())
        .await
        .unwrap();

    assert!(resolution.warnings.is_empty());
    assert_eq!(resolution.ledger[0].spot_price(), UnknownOr::Known(dec!(46500)));
}

#[tokio::test]
async fn test_unroutable_price_degrades_to_warning() {
    let kraken = MockMarket::new("Kraken", &[("BTC", "USD", dec!(46500))]);
    let resolver = priced_resolver(vec![kraken]);

    let mut record = buy("0x02", 6, UnknownOr::Unknown);
    if let Transaction::In(ref mut r) = record {
        r.asset = "DOGE".to_string();
    }

    let resolution = resolver.resolve(vec![record], &no_hints()).await.unwrap();
    assert_eq!(resolution.ledger[0].spot_price(), UnknownOr::Unknown);
    assert_eq!(resolution.warnings.len(), 1);
    assert!(matches!(
        &resolution.warnings[0],
        Warning::UnresolvedSpotPrice { asset, .. } if asset == "DOGE"
    ));
}

#[tokio::test]
async fn test_price_resolution_can_be_disabled() {
    let kraken = MockMarket::new("Kraken", &[("BTC", "USD", dec!(46500))]);
    let mut builder = PriceGraph::builder();
    builder.add_market("Kraken", "BTC", "USD");
    let registry = SourceRegistry::new(vec![kraken.clone()], Arc::new(BarCache::in_memory()));
    let router = PriceRouter::new(
        builder.build(&["USD".to_string()]),
        Arc::new(registry),
        PriceSelection::High,
        "Kraken".to_string(),
    );
    let settings = ResolverSettings {
        resolve_missing_prices: false,
        ..Default::default()
    };
    let resolver = TransactionResolver::new(settings, Some(Arc::new(router)));

    let resolution = resolver
        .resolve(vec![buy("0x03", 6, UnknownOr::Unknown)], &no_hints())
        .await
        .unwrap();

    assert_eq!(resolution.ledger[0].spot_price(), UnknownOr::Unknown);
    assert!(resolution.warnings.is_empty());
    assert_eq!(kraken.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_foreign_fiat_amounts_are_normalized() {
    let fiat_rates = MockMarket::new("Exchangerate.host", &[("EUR", "USD", dec!(1.1))]);
    let resolver = priced_resolver(vec![fiat_rates]);

    let mut record = buy("0x04", 7, UnknownOr::Known(dec!(40000)));
    if let Transaction::In(ref mut r) = record {
        r.fiat_currency = "EUR".to_string();
        r.fiat_in_no_fee = Some(dec!(100));
        r.fiat_fee = Some(dec!(2));
    }

    let resolution = resolver.resolve(vec![record], &no_hints()).await.unwrap();
    assert!(resolution.warnings.is_empty());
    let Transaction::In(normalized) = &resolution.ledger[0] else {
        panic!("expected an in transaction");
    };
    assert_eq!(normalized.fiat_currency, "USD");
    assert_eq!(normalized.spot_price, UnknownOr::Known(dec!(44000)));
    assert_eq!(normalized.fiat_in_no_fee, Some(dec!(110)));
    assert_eq!(normalized.fiat_fee, Some(dec!(2.2)));
}

#[tokio::test]
async fn test_failed_fiat_conversion_degrades_to_warning() {
    let resolver = priced_resolver(Vec::new());

    let mut record = buy("0x05", 7, UnknownOr::Known(dec!(40000)));
    if let Transaction::In(ref mut r) = record {
        r.fiat_currency = "JPY".to_string();
    }

    let resolution = resolver.resolve(vec![record], &no_hints()).await.unwrap();
    let Transaction::In(untouched) = &resolution.ledger[0] else {
        panic!("expected an in transaction");
    };
    assert_eq!(untouched.fiat_currency, "JPY");
    assert!(matches!(
        &resolution.warnings[0],
        Warning::UnconvertedFiat { from_currency, .. } if from_currency == "JPY"
    ));
}

#[tokio::test]
async fn test_ledger_is_time_ordered() {
    let resolver = offline_resolver();
    let records = vec![
        buy("0x08", 9, UnknownOr::Known(dec!(1))),
        buy("0x06", 2, UnknownOr::Known(dec!(1))),
        buy("0x07", 5, UnknownOr::Known(dec!(1))),
    ];

    let resolution = resolver.resolve(records, &no_hints()).await.unwrap();
    let days: Vec<u32> = resolution
        .ledger
        .iter()
        .map(|record| chrono::Datelike::day(&record.timestamp()))
        .collect();
    assert_eq!(days, vec![2, 5, 9]);
}

#[tokio::test]
async fn test_records_without_unique_id_pass_through() {
    let resolver = offline_resolver();
    let mut record = buy("ignored", 1, UnknownOr::Known(dec!(1)));
    if let Transaction::In(ref mut r) = record {
        r.unique_id = UnknownOr::Unknown;
    }

    let resolution = resolver.resolve(vec![record], &no_hints()).await.unwrap();
    assert_eq!(resolution.ledger.len(), 1);
    assert!(resolution.ledger[0].unique_id().is_unknown());
}
