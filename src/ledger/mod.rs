//! User ledger: the durable record of wallets, nonces and transaction history.
//!
//! # Responsibilities
//! - Bind exactly one wallet to each user, permanently
//! - Keep each user's history in insertion order with forward-only status
//! - Track the highest used nonce and the last observed balance
//! - Survive restarts (one JSON document per user)

pub mod store;
pub mod types;

pub use store::UserLedger;
pub use types::{
    CachedBalance, LedgerError, LedgerResult, OperationKind, RecordUpdate, TransactionRecord,
    TxStatus, UserRecord,
};
