//! Transaction reconciliation and pricing.
//!
//! Ingestion adapters feed this crate a normalized, unordered set of
//! partial transaction records. The [`TransactionResolver`] applies user
//! hints, pairs and merges the halves of cross-platform transfers via
//! their correlation keys, and backfills missing valuations through the
//! [`PriceRouter`], which finds conversion paths across a graph of
//! tradeable markets and fiat exchange rates. The output is a
//! time-ordered ledger ready for downstream tax computation.

pub mod errors;
pub mod resolver;
pub mod routing;
pub mod settings;
pub mod transactions;

pub use errors::{Error, Result, ValidationError, Warning};
pub use resolver::{Resolution, TransactionHint, TransactionResolver};
pub use routing::{PriceGraph, PriceGraphBuilder, PriceRouter, RouteError};
pub use settings::{ResolverSettings, DEFAULT_EXCHANGE, DEFAULT_FIAT_PRIORITY};
pub use transactions::{
    InTransaction, InTransactionType, IntraSide, IntraTransaction, OutTransaction,
    OutTransactionType, Transaction, UnknownOr,
};
