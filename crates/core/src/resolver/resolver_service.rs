//! Record reconciliation.
//!
//! The resolver consumes the full in-memory record set produced by the
//! ingestion adapters and emits a time-ordered ledger: hints are applied
//! first, partial records sharing a correlation key are merged, and any
//! record still missing a valuation is priced through the router. Merge
//! logic runs single-threaded over a consistent view; only the price
//! lookups fan out through the bounded fetch pool.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rust_decimal::Decimal;

use taxfolio_market_data::{FetchPool, DEFAULT_MAX_IN_FLIGHT};

use super::hints::{apply_hint, TransactionHint};
use super::merge::{merge_intra_intra, merge_out_in};
use crate::errors::{Error, Result, Warning};
use crate::routing::{PriceRouter, RouteError};
use crate::settings::ResolverSettings;
use crate::transactions::Transaction;

/// Output of a resolution run. Warnings are non-fatal gaps; the ledger is
/// complete apart from fields the warnings point at.
#[derive(Debug)]
pub struct Resolution {
    pub ledger: Vec<Transaction>,
    pub warnings: Vec<Warning>,
}

pub struct TransactionResolver {
    settings: ResolverSettings,
    router: Option<Arc<PriceRouter>>,
    fetch_pool: FetchPool,
}

impl TransactionResolver {
    pub fn new(settings: ResolverSettings, router: Option<Arc<PriceRouter>>) -> Self {
        Self {
            settings,
            router,
            fetch_pool: FetchPool::new(DEFAULT_MAX_IN_FLIGHT),
        }
    }

    /// Reconciles the record set into a time-ordered ledger.
    ///
    /// Ambiguity around a correlation key is fatal: the run stops with the
    /// offending `unique_id` so the user can fix the source data or add a
    /// hint. Missing prices and conversions never are; they degrade to a
    /// warning and the field stays unknown.
    pub async fn resolve(
        &self,
        records: Vec<Transaction>,
        hints: &HashMap<String, TransactionHint>,
    ) -> Result<Resolution> {
        for record in &records {
            record.validate()?;
        }

        let recast = self.apply_hints(records, hints)?;
        let mut ledger = self.merge_partials(recast)?;

        let mut warnings = Vec::new();
        let backfilled = self.backfill_prices(&mut ledger, &mut warnings).await;
        self.normalize_fiat(&mut ledger, &mut warnings, &backfilled).await;

        ledger.sort_by(|a, b| {
            a.timestamp()
                .cmp(&b.timestamp())
                .then_with(|| a.cmp(b))
        });

        info!(
            "Resolved {} record(s) with {} warning(s)",
            ledger.len(),
            warnings.len()
        );
        Ok(Resolution { ledger, warnings })
    }

    // Hints run before grouping and take precedence over automatic merge
    // inference.
    fn apply_hints(
        &self,
        records: Vec<Transaction>,
        hints: &HashMap<String, TransactionHint>,
    ) -> Result<Vec<Transaction>> {
        let mut recast = Vec::with_capacity(records.len());
        for record in records {
            let hint = record.unique_id().known().and_then(|id| hints.get(id));
            match hint {
                Some(hint) => {
                    debug!("Applying hint to {}", record.unique_id());
                    recast.push(apply_hint(record, hint, &self.settings.native_fiat)?);
                }
                None => recast.push(record),
            }
        }
        Ok(recast)
    }

    fn merge_partials(&self, records: Vec<Transaction>) -> Result<Vec<Transaction>> {
        let mut ledger = Vec::with_capacity(records.len());
        let mut groups: BTreeMap<(String, String), Vec<Transaction>> = BTreeMap::new();

        for record in records {
            match record.unique_id().known() {
                Some(id) => {
                    let key = (record.asset().to_string(), id.clone());
                    groups.entry(key).or_default().push(record);
                }
                None => {
                    // No correlation key; nothing to pair against.
                    debug!("Unmatchable record without unique_id, emitting as-is");
                    ledger.push(record);
                }
            }
        }

        for ((_, unique_id), group) in groups {
            let count = group.len();
            let mut records = group.into_iter();
            match (records.next(), records.next(), records.next()) {
                (Some(only), None, _) => ledger.push(only),
                (Some(first), Some(second), None) => {
                    ledger.push(merge_pair(first, second, &unique_id)?);
                }
                _ => {
                    return Err(Error::AmbiguousMerge {
                        unique_id,
                        detail: format!("{} records share this unique id", count),
                    });
                }
            }
        }

        Ok(ledger)
    }

    /// Prices records whose spot price is unknown, in the native fiat.
    /// Returns the indices that were filled so fiat normalization does not
    /// rescale them again.
    async fn backfill_prices(
        &self,
        ledger: &mut [Transaction],
        warnings: &mut Vec<Warning>,
    ) -> HashSet<usize> {
        let mut backfilled = HashSet::new();
        if !self.settings.resolve_missing_prices {
            return backfilled;
        }
        let Some(router) = &self.router else {
            return backfilled;
        };

        let jobs: Vec<PriceJob> = ledger
            .iter()
            .enumerate()
            .filter(|(_, record)| record.spot_price().is_unknown())
            .map(|(index, record)| PriceJob {
                index,
                base: record.asset().to_string(),
                timestamp: record.timestamp(),
                exchange_context: record.exchange_context().map(str::to_string),
                unique_id: record.unique_id().to_string(),
            })
            .collect();
        if jobs.is_empty() {
            return backfilled;
        }

        let results = self.run_conversions(router, jobs).await;
        for (job, result) in results {
            match result {
                Ok(rate) => {
                    ledger[job.index].set_spot_price(rate);
                    backfilled.insert(job.index);
                }
                Err(error) => {
                    warn!(
                        "Leaving spot price unknown for {} at {}: {}",
                        job.base, job.timestamp, error
                    );
                    warnings.push(Warning::UnresolvedSpotPrice {
                        asset: job.base,
                        timestamp: job.timestamp,
                        unique_id: job.unique_id,
                        detail: error.to_string(),
                    });
                }
            }
        }
        backfilled
    }

    /// Rewrites fiat-denominated fields expressed in a foreign fiat into
    /// the native one.
    async fn normalize_fiat(
        &self,
        ledger: &mut [Transaction],
        warnings: &mut Vec<Warning>,
        skip_spot: &HashSet<usize>,
    ) {
        let Some(router) = &self.router else {
            return;
        };
        let native = &self.settings.native_fiat;

        let jobs: Vec<PriceJob> = ledger
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                let foreign = match record {
                    Transaction::In(r) if &r.fiat_currency != native => Some(&r.fiat_currency),
                    Transaction::Out(r) if &r.fiat_currency != native => Some(&r.fiat_currency),
                    _ => None,
                }?;
                Some(PriceJob {
                    index,
                    base: foreign.clone(),
                    timestamp: record.timestamp(),
                    exchange_context: None,
                    unique_id: record.unique_id().to_string(),
                })
            })
            .collect();
        if jobs.is_empty() {
            return;
        }

        let results = self.run_conversions(router, jobs).await;
        for (job, result) in results {
            match result {
                Ok(rate) => {
                    let convert_spot = !skip_spot.contains(&job.index);
                    rescale_fiat(&mut ledger[job.index], rate, native, convert_spot);
                }
                Err(error) => {
                    warn!(
                        "Leaving {} amounts unconverted at {}: {}",
                        job.base, job.timestamp, error
                    );
                    warnings.push(Warning::UnconvertedFiat {
                        from_currency: job.base,
                        to_currency: native.clone(),
                        timestamp: job.timestamp,
                        unique_id: job.unique_id,
                        detail: error.to_string(),
                    });
                }
            }
        }
    }

    async fn run_conversions(
        &self,
        router: &Arc<PriceRouter>,
        jobs: Vec<PriceJob>,
    ) -> Vec<(PriceJob, std::result::Result<Decimal, RouteError>)> {
        let native = self.settings.native_fiat.clone();
        let futures: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let router = Arc::clone(router);
                let native = native.clone();
                async move {
                    let rate = router
                        .convert(
                            &job.base,
                            &native,
                            job.timestamp,
                            job.exchange_context.as_deref(),
                        )
                        .await;
                    (job, rate)
                }
            })
            .collect();
        self.fetch_pool.run_all(futures).await
    }
}

struct PriceJob {
    index: usize,
    base: String,
    timestamp: DateTime<Utc>,
    exchange_context: Option<String>,
    unique_id: String,
}

fn merge_pair(first: Transaction, second: Transaction, unique_id: &str) -> Result<Transaction> {
    match (first, second) {
        (Transaction::Intra(a), Transaction::Intra(b)) => {
            Ok(Transaction::Intra(merge_intra_intra(a, b, unique_id)?))
        }
        (Transaction::Out(out), Transaction::In(incoming))
        | (Transaction::In(incoming), Transaction::Out(out)) => {
            Ok(Transaction::Intra(merge_out_in(out, incoming, unique_id)?))
        }
        _ => Err(Error::AmbiguousMerge {
            unique_id: unique_id.to_string(),
            detail: "records are not a transfer pair or an out/in pair".to_string(),
        }),
    }
}

fn rescale_fiat(record: &mut Transaction, rate: Decimal, native: &str, convert_spot: bool) {
    match record {
        Transaction::In(r) => {
            if convert_spot {
                r.spot_price = r.spot_price.map(|price| price * rate);
            }
            r.fiat_fee = r.fiat_fee.map(|amount| amount * rate);
            r.fiat_in_no_fee = r.fiat_in_no_fee.map(|amount| amount * rate);
            r.fiat_in_with_fee = r.fiat_in_with_fee.map(|amount| amount * rate);
            r.fiat_currency = native.to_string();
        }
        Transaction::Out(r) => {
            if convert_spot {
                r.spot_price = r.spot_price.map(|price| price * rate);
            }
            r.fiat_fee = r.fiat_fee.map(|amount| amount * rate);
            r.fiat_out_no_fee = r.fiat_out_no_fee.map(|amount| amount * rate);
            r.fiat_currency = native.to_string();
        }
        Transaction::Intra(_) => {}
    }
}
