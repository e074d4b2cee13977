mod sentinel;
mod transactions_model;

pub use sentinel::UnknownOr;
pub use transactions_model::{
    InTransaction, InTransactionType, IntraSide, IntraTransaction, OutTransaction,
    OutTransactionType, Transaction,
};
