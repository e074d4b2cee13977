//! Canonical transaction records.
//!
//! Ingestion adapters map their native CSV/REST formats into these three
//! variants. Mandatory fields that an adapter cannot observe carry the
//! `unknown` sentinel ([`UnknownOr`]); fields that do not apply to a
//! variant are `Option`s. The resolver consumes the full record set and
//! emits a new one, so these types are cheap to clone and carry no
//! behavior beyond validation and field access.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::UnknownOr;
use crate::errors::ValidationError;

/// How an asset entered the filer's holdings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InTransactionType {
    Airdrop,
    Buy,
    Donate,
    Gift,
    Hardfork,
    Income,
    Interest,
    Mining,
    Staking,
    Wages,
}

impl FromStr for InTransactionType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "airdrop" => Ok(Self::Airdrop),
            "buy" => Ok(Self::Buy),
            "donate" => Ok(Self::Donate),
            "gift" => Ok(Self::Gift),
            "hardfork" => Ok(Self::Hardfork),
            "income" => Ok(Self::Income),
            "interest" => Ok(Self::Interest),
            "mining" => Ok(Self::Mining),
            "staking" => Ok(Self::Staking),
            "wages" => Ok(Self::Wages),
            _ => Err(ValidationError::InvalidTransactionType {
                value: value.to_string(),
                detail: "not a valid acquisition type",
            }),
        }
    }
}

impl fmt::Display for InTransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Airdrop => "airdrop",
            Self::Buy => "buy",
            Self::Donate => "donate",
            Self::Gift => "gift",
            Self::Hardfork => "hardfork",
            Self::Income => "income",
            Self::Interest => "interest",
            Self::Mining => "mining",
            Self::Staking => "staking",
            Self::Wages => "wages",
        };
        f.write_str(name)
    }
}

/// How an asset left the filer's holdings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutTransactionType {
    Donate,
    Gift,
    Sell,
}

impl FromStr for OutTransactionType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "donate" => Ok(Self::Donate),
            "gift" => Ok(Self::Gift),
            "sell" => Ok(Self::Sell),
            _ => Err(ValidationError::InvalidTransactionType {
                value: value.to_string(),
                detail: "not a valid disposal type",
            }),
        }
    }
}

impl fmt::Display for OutTransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Donate => "donate",
            Self::Gift => "gift",
            Self::Sell => "sell",
        };
        f.write_str(name)
    }
}

/// Funds flowing into an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InTransaction {
    pub unique_id: UnknownOr<String>,
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub exchange: String,
    pub holder: String,
    pub transaction_type: UnknownOr<InTransactionType>,
    /// Value of one unit of `asset` in `fiat_currency`.
    pub spot_price: UnknownOr<Decimal>,
    pub crypto_in: Decimal,
    pub crypto_fee: Option<Decimal>,
    pub fiat_fee: Option<Decimal>,
    pub fiat_in_no_fee: Option<Decimal>,
    pub fiat_in_with_fee: Option<Decimal>,
    /// Currency of the fiat-denominated fields above.
    pub fiat_currency: String,
    pub notes: Option<String>,
}

impl InTransaction {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let record = || format!("in transaction {}", self.unique_id);
        require_non_empty("asset", &self.asset, record)?;
        require_non_empty("exchange", &self.exchange, record)?;
        require_non_empty("holder", &self.holder, record)?;
        require_non_negative("crypto_in", UnknownOr::Known(self.crypto_in), record)?;
        require_non_negative("spot_price", self.spot_price, record)?;
        require_non_negative_opt("crypto_fee", self.crypto_fee, record)?;
        require_non_negative_opt("fiat_fee", self.fiat_fee, record)?;
        require_non_negative_opt("fiat_in_no_fee", self.fiat_in_no_fee, record)?;
        require_non_negative_opt("fiat_in_with_fee", self.fiat_in_with_fee, record)?;
        if self.crypto_fee.is_some() && self.fiat_fee.is_some() {
            return Err(ValidationError::ConflictingFees { record: record() });
        }
        Ok(())
    }
}

/// Funds flowing out of an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutTransaction {
    pub unique_id: UnknownOr<String>,
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub exchange: String,
    pub holder: String,
    pub transaction_type: UnknownOr<OutTransactionType>,
    pub spot_price: UnknownOr<Decimal>,
    pub crypto_out_no_fee: Decimal,
    pub crypto_fee: Decimal,
    pub crypto_out_with_fee: Option<Decimal>,
    pub fiat_out_no_fee: Option<Decimal>,
    pub fiat_fee: Option<Decimal>,
    pub fiat_currency: String,
    pub notes: Option<String>,
}

impl OutTransaction {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let record = || format!("out transaction {}", self.unique_id);
        require_non_empty("asset", &self.asset, record)?;
        require_non_empty("exchange", &self.exchange, record)?;
        require_non_empty("holder", &self.holder, record)?;
        require_non_negative("crypto_out_no_fee", UnknownOr::Known(self.crypto_out_no_fee), record)?;
        require_non_negative("crypto_fee", UnknownOr::Known(self.crypto_fee), record)?;
        require_non_negative("spot_price", self.spot_price, record)?;
        require_non_negative_opt("crypto_out_with_fee", self.crypto_out_with_fee, record)?;
        require_non_negative_opt("fiat_out_no_fee", self.fiat_out_no_fee, record)?;
        require_non_negative_opt("fiat_fee", self.fiat_fee, record)?;
        // A fiat fee is only meaningful when the crypto fee carries nothing.
        if self.fiat_fee.is_some() && !self.crypto_fee.is_zero() {
            return Err(ValidationError::ConflictingFees { record: record() });
        }
        Ok(())
    }
}

/// One endpoint of a transfer between the filer's own accounts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntraSide {
    pub exchange: UnknownOr<String>,
    pub holder: UnknownOr<String>,
    /// `crypto_sent` on the from-side, `crypto_received` on the to-side.
    pub amount: UnknownOr<Decimal>,
}

impl IntraSide {
    pub fn unknown() -> Self {
        Self {
            exchange: UnknownOr::Unknown,
            holder: UnknownOr::Unknown,
            amount: UnknownOr::Unknown,
        }
    }
}

/// Transfer between two accounts of the same filer.
///
/// A partial record has exactly one side populated; the other side is
/// absent until a matching record with the same `unique_id` fills it in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntraTransaction {
    pub unique_id: UnknownOr<String>,
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub spot_price: UnknownOr<Decimal>,
    pub from: Option<IntraSide>,
    pub to: Option<IntraSide>,
    pub notes: Option<String>,
}

impl IntraTransaction {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let record = || format!("intra transaction {}", self.unique_id);
        require_non_empty("asset", &self.asset, record)?;
        if self.from.is_none() && self.to.is_none() {
            return Err(ValidationError::MissingField {
                field: "from/to",
                record: record(),
            });
        }
        require_non_negative("spot_price", self.spot_price, record)?;
        if let Some(from) = &self.from {
            require_non_negative("crypto_sent", from.amount, record)?;
        }
        if let Some(to) = &self.to {
            require_non_negative("crypto_received", to.amount, record)?;
        }
        Ok(())
    }

    /// A partial record with only the sending side observed.
    pub fn is_send_half(&self) -> bool {
        self.from.is_some() && self.to.is_none()
    }

    /// A partial record with only the receiving side observed.
    pub fn is_receive_half(&self) -> bool {
        self.to.is_some() && self.from.is_none()
    }
}

#[derive(Clone, Debug)]
pub enum Transaction {
    In(InTransaction),
    Out(OutTransaction),
    Intra(IntraTransaction),
}

impl Transaction {
    pub fn unique_id(&self) -> &UnknownOr<String> {
        match self {
            Transaction::In(t) => &t.unique_id,
            Transaction::Out(t) => &t.unique_id,
            Transaction::Intra(t) => &t.unique_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Transaction::In(t) => t.timestamp,
            Transaction::Out(t) => t.timestamp,
            Transaction::Intra(t) => t.timestamp,
        }
    }

    pub fn asset(&self) -> &str {
        match self {
            Transaction::In(t) => &t.asset,
            Transaction::Out(t) => &t.asset,
            Transaction::Intra(t) => &t.asset,
        }
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            Transaction::In(t) => t.notes.as_deref(),
            Transaction::Out(t) => t.notes.as_deref(),
            Transaction::Intra(t) => t.notes.as_deref(),
        }
    }

    pub fn spot_price(&self) -> UnknownOr<Decimal> {
        match self {
            Transaction::In(t) => t.spot_price,
            Transaction::Out(t) => t.spot_price,
            Transaction::Intra(t) => t.spot_price,
        }
    }

    pub fn set_spot_price(&mut self, price: Decimal) {
        let slot = match self {
            Transaction::In(t) => &mut t.spot_price,
            Transaction::Out(t) => &mut t.spot_price,
            Transaction::Intra(t) => &mut t.spot_price,
        };
        *slot = UnknownOr::Known(price);
    }

    /// The exchange this record originates from, used to prefer that
    /// exchange's own markets when pricing.
    pub fn exchange_context(&self) -> Option<&str> {
        match self {
            Transaction::In(t) => Some(&t.exchange),
            Transaction::Out(t) => Some(&t.exchange),
            Transaction::Intra(t) => t
                .from
                .as_ref()
                .and_then(|side| side.exchange.known())
                .or_else(|| t.to.as_ref().and_then(|side| side.exchange.known()))
                .map(String::as_str),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Transaction::In(t) => t.validate(),
            Transaction::Out(t) => t.validate(),
            Transaction::Intra(t) => t.validate(),
        }
    }

    fn key(&self) -> (&UnknownOr<String>, DateTime<Utc>, &str) {
        (self.unique_id(), self.timestamp(), self.asset())
    }
}

// Identity is the grouping key, not full structural equality; two partial
// halves of the same event compare equal here on purpose.
impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Transaction {}

impl PartialOrd for Transaction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Transaction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

fn require_non_empty(
    field: &'static str,
    value: &str,
    record: impl Fn() -> String,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field,
            record: record(),
        });
    }
    Ok(())
}

fn require_non_negative(
    field: &'static str,
    value: UnknownOr<Decimal>,
    record: impl Fn() -> String,
) -> Result<(), ValidationError> {
    if let UnknownOr::Known(amount) = value {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValidationError::NegativeAmount {
                field,
                record: record(),
            });
        }
    }
    Ok(())
}

fn require_non_negative_opt(
    field: &'static str,
    value: Option<Decimal>,
    record: impl Fn() -> String,
) -> Result<(), ValidationError> {
    match value {
        Some(amount) => require_non_negative(field, UnknownOr::Known(amount), record),
        None => Ok(()),
    }
}
