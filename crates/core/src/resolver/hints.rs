//! User disambiguation hints.
//!
//! A hint recasts how the record carrying a given `unique_id` should be
//! interpreted, before any merge grouping happens. Typical use: an
//! exchange reports a withdrawal as a plain out transaction, but the user
//! knows it was a gift, or one half of a transfer to self.

use rust_decimal::Decimal;

use crate::errors::Error;
use crate::transactions::{
    InTransaction, InTransactionType, IntraSide, IntraTransaction, OutTransaction,
    OutTransactionType, Transaction, UnknownOr,
};

#[derive(Clone, Debug, PartialEq)]
pub enum TransactionHint {
    In {
        transaction_type: UnknownOr<InTransactionType>,
        notes: Option<String>,
    },
    Out {
        transaction_type: UnknownOr<OutTransactionType>,
        notes: Option<String>,
    },
    Intra { notes: Option<String> },
}

impl TransactionHint {
    fn notes(&self) -> Option<&str> {
        match self {
            TransactionHint::In { notes, .. } => notes.as_deref(),
            TransactionHint::Out { notes, .. } => notes.as_deref(),
            TransactionHint::Intra { notes } => notes.as_deref(),
        }
    }
}

/// Recasts a record per the hint.
///
/// Direction changes are only accepted when they cannot lose information:
/// an in transaction never becomes an out transaction and vice versa, and
/// a transfer half only collapses to a one-sided record when its other
/// side was never observed.
pub fn apply_hint(
    transaction: Transaction,
    hint: &TransactionHint,
    native_fiat: &str,
) -> Result<Transaction, Error> {
    let unique_id = transaction.unique_id().to_string();
    let notes = prepend_notes(hint.notes(), transaction.notes());
    let invalid = |detail: &str| Error::InvalidHint {
        unique_id: unique_id.clone(),
        detail: detail.to_string(),
    };

    match (hint, transaction) {
        (TransactionHint::In { transaction_type, .. }, Transaction::In(mut record)) => {
            record.transaction_type = *transaction_type;
            record.notes = notes;
            Ok(Transaction::In(record))
        }
        (TransactionHint::In { .. }, Transaction::Out(_)) => {
            Err(invalid("cannot recast an out transaction as in"))
        }
        (TransactionHint::In { transaction_type, .. }, Transaction::Intra(record)) => {
            if !side_unobserved(record.from.as_ref()) {
                return Err(invalid("source side must be unknown to recast transfer as in"));
            }
            let to = record.to.ok_or_else(|| invalid("transfer has no destination side"))?;
            let exchange = to
                .exchange
                .into_known()
                .ok_or_else(|| invalid("destination exchange is unknown"))?;
            let holder = to
                .holder
                .into_known()
                .ok_or_else(|| invalid("destination holder is unknown"))?;
            let crypto_in = to
                .amount
                .into_known()
                .ok_or_else(|| invalid("received amount is unknown"))?;
            let result = InTransaction {
                unique_id: record.unique_id,
                timestamp: record.timestamp,
                asset: record.asset,
                exchange,
                holder,
                transaction_type: *transaction_type,
                spot_price: record.spot_price,
                crypto_in,
                crypto_fee: None,
                fiat_fee: None,
                fiat_in_no_fee: None,
                fiat_in_with_fee: None,
                fiat_currency: native_fiat.to_string(),
                notes,
            };
            result.validate()?;
            Ok(Transaction::In(result))
        }

        (TransactionHint::Out { transaction_type, .. }, Transaction::Out(mut record)) => {
            record.transaction_type = *transaction_type;
            record.notes = notes;
            Ok(Transaction::Out(record))
        }
        (TransactionHint::Out { .. }, Transaction::In(_)) => {
            Err(invalid("cannot recast an in transaction as out"))
        }
        (TransactionHint::Out { transaction_type, .. }, Transaction::Intra(record)) => {
            if !side_unobserved(record.to.as_ref()) {
                return Err(invalid(
                    "destination side must be unknown to recast transfer as out",
                ));
            }
            let from = record.from.ok_or_else(|| invalid("transfer has no source side"))?;
            let exchange = from
                .exchange
                .into_known()
                .ok_or_else(|| invalid("source exchange is unknown"))?;
            let holder = from
                .holder
                .into_known()
                .ok_or_else(|| invalid("source holder is unknown"))?;
            let sent = from
                .amount
                .into_known()
                .ok_or_else(|| invalid("sent amount is unknown"))?;
            // When the received amount was observed, the difference is the
            // network fee; otherwise the full sent amount left the wallet.
            let received = record
                .to
                .and_then(|side| side.amount.into_known());
            let (crypto_out_no_fee, crypto_fee) = match received {
                Some(received) => (received, sent - received),
                None => (sent, Decimal::ZERO),
            };
            let result = OutTransaction {
                unique_id: record.unique_id,
                timestamp: record.timestamp,
                asset: record.asset,
                exchange,
                holder,
                transaction_type: *transaction_type,
                spot_price: record.spot_price,
                crypto_out_no_fee,
                crypto_fee,
                crypto_out_with_fee: None,
                fiat_out_no_fee: None,
                fiat_fee: None,
                fiat_currency: native_fiat.to_string(),
                notes,
            };
            result.validate()?;
            Ok(Transaction::Out(result))
        }

        (TransactionHint::Intra { .. }, Transaction::In(record)) => {
            let result = IntraTransaction {
                unique_id: record.unique_id,
                timestamp: record.timestamp,
                asset: record.asset,
                spot_price: record.spot_price,
                from: None,
                to: Some(IntraSide {
                    exchange: UnknownOr::Known(record.exchange),
                    holder: UnknownOr::Known(record.holder),
                    amount: UnknownOr::Known(record.crypto_in),
                }),
                notes,
            };
            Ok(Transaction::Intra(result))
        }
        (TransactionHint::Intra { .. }, Transaction::Out(record)) => {
            let result = IntraTransaction {
                unique_id: record.unique_id,
                timestamp: record.timestamp,
                asset: record.asset,
                spot_price: record.spot_price,
                from: Some(IntraSide {
                    exchange: UnknownOr::Known(record.exchange),
                    holder: UnknownOr::Known(record.holder),
                    amount: UnknownOr::Known(record.crypto_out_no_fee),
                }),
                to: None,
                notes,
            };
            Ok(Transaction::Intra(result))
        }
        (TransactionHint::Intra { .. }, Transaction::Intra(mut record)) => {
            record.notes = notes;
            Ok(Transaction::Intra(record))
        }
    }
}

// The amount may still be known (observed on chain) without the
// counterparty account being identified.
fn side_unobserved(side: Option<&IntraSide>) -> bool {
    match side {
        None => true,
        Some(side) => side.exchange.is_unknown() && side.holder.is_unknown(),
    }
}

pub(crate) fn prepend_notes(first: Option<&str>, second: Option<&str>) -> Option<String> {
    match (first, second) {
        (Some(a), Some(b)) => Some(format!("{}; {}", a, b)),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    }
}
