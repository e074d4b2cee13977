//! Pairwise merging of partial records sharing a correlation key.

use rust_decimal::Decimal;

use super::hints::prepend_notes;
use crate::errors::Error;
use crate::transactions::{
    InTransaction, IntraSide, IntraTransaction, OutTransaction, UnknownOr,
};

/// Merges the two halves of a transfer reported by both endpoints.
///
/// The halves must be complementary: one record observed only the sending
/// side, the other only the receiving side. The merged record carries the
/// receiving side's timestamp, the moment the funds became available.
pub fn merge_intra_intra(
    a: IntraTransaction,
    b: IntraTransaction,
    unique_id: &str,
) -> Result<IntraTransaction, Error> {
    let (send, receive) = if a.is_send_half() && b.is_receive_half() {
        (a, b)
    } else if b.is_send_half() && a.is_receive_half() {
        (b, a)
    } else {
        return Err(Error::AmbiguousMerge {
            unique_id: unique_id.to_string(),
            detail: "two transfer records do not form a complementary send/receive pair"
                .to_string(),
        });
    };

    let spot_price = reconcile_spot_price(send.spot_price, receive.spot_price, unique_id)?;
    let notes = prepend_notes(send.notes.as_deref(), receive.notes.as_deref());

    Ok(IntraTransaction {
        unique_id: receive.unique_id,
        timestamp: receive.timestamp,
        asset: receive.asset,
        spot_price,
        from: send.from,
        to: receive.to,
        notes,
    })
}

/// Merges an out record and an in record describing the same transfer.
///
/// Some exchanges report their half of a transfer to self as a plain
/// withdrawal or deposit. The pair collapses into one transfer record,
/// timestamped when the destination received the funds.
pub fn merge_out_in(
    out: OutTransaction,
    incoming: InTransaction,
    unique_id: &str,
) -> Result<IntraTransaction, Error> {
    let spot_price = reconcile_spot_price(out.spot_price, incoming.spot_price, unique_id)?;
    let notes = prepend_notes(incoming.notes.as_deref(), out.notes.as_deref());

    Ok(IntraTransaction {
        unique_id: incoming.unique_id,
        timestamp: incoming.timestamp,
        asset: incoming.asset,
        spot_price,
        from: Some(IntraSide {
            exchange: UnknownOr::Known(out.exchange),
            holder: UnknownOr::Known(out.holder),
            amount: UnknownOr::Known(out.crypto_out_no_fee),
        }),
        to: Some(IntraSide {
            exchange: UnknownOr::Known(incoming.exchange),
            holder: UnknownOr::Known(incoming.holder),
            amount: UnknownOr::Known(incoming.crypto_in),
        }),
        notes,
    })
}

fn reconcile_spot_price(
    a: UnknownOr<Decimal>,
    b: UnknownOr<Decimal>,
    unique_id: &str,
) -> Result<UnknownOr<Decimal>, Error> {
    a.reconcile(b).map_err(|(a, b)| Error::AmbiguousMerge {
        unique_id: unique_id.to_string(),
        detail: format!("conflicting spot prices {} and {}", a, b),
    })
}
