mod hints;
mod merge;
mod resolver_service;

pub use hints::{apply_hint, TransactionHint};
pub use resolver_service::{Resolution, TransactionResolver};

#[cfg(test)]
mod resolver_service_tests;
