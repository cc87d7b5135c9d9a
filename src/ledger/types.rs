//! Ledger record types.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ErrorInfo;
use crate::identity::UserId;
use crate::vault::StoredWallet;

/// Current on-disk layout version.
pub const SCHEMA_VERSION: u32 = 1;

/// Seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Lifecycle of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TxStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transaction was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Token allowance for the vault, sent ahead of a deposit.
    Approve,
    Deposit,
    ClaimReward,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Approve => "approve",
            OperationKind::Deposit => "deposit",
            OperationKind::ClaimReward => "claim_reward",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one transaction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub request_id: Uuid,
    pub kind: OperationKind,
    pub from: Address,
    pub target: Address,
    pub amount: Option<U256>,
    pub nonce: Option<u64>,
    pub hash: Option<TxHash>,
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub confirmations: u32,
    pub error: Option<ErrorInfo>,
    /// Earlier record this attempt replaces (e.g. after a nonce refresh).
    pub retry_of: Option<Uuid>,
    /// Signed bytes, kept while Pending so a dropped broadcast can be resent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Bytes>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl TransactionRecord {
    /// A record for a transaction the node accepted (or may have accepted).
    pub fn pending(
        request_id: Uuid,
        kind: OperationKind,
        from: Address,
        target: Address,
        amount: Option<U256>,
        nonce: u64,
        hash: TxHash,
    ) -> Self {
        let now = now_secs();
        Self {
            request_id,
            kind,
            from,
            target,
            amount,
            nonce: Some(nonce),
            hash: Some(hash),
            status: TxStatus::Pending,
            block_number: None,
            confirmations: 0,
            error: None,
            retry_of: None,
            raw: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A record for an attempt that ended before (or at) submission.
    pub fn failed(
        request_id: Uuid,
        kind: OperationKind,
        from: Address,
        target: Address,
        amount: Option<U256>,
        nonce: Option<u64>,
        error: ErrorInfo,
    ) -> Self {
        let now = now_secs();
        Self {
            request_id,
            kind,
            from,
            target,
            amount,
            nonce,
            hash: None,
            status: TxStatus::Failed,
            block_number: None,
            confirmations: 0,
            error: Some(error),
            retry_of: None,
            raw: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_retry_of(mut self, previous: Option<Uuid>) -> Self {
        self.retry_of = previous;
        self
    }

    pub fn with_raw(mut self, raw: Bytes) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Whether this record's nonce is spent, or may still be.
    ///
    /// Refused submissions never reached the chain, and a Failed record
    /// without a block was dropped before inclusion; neither holds a nonce.
    pub fn holds_nonce(&self) -> bool {
        self.nonce.is_some()
            && self.hash.is_some()
            && (self.status != TxStatus::Failed || self.block_number.is_some())
    }

    /// Apply an update; only forward transitions are accepted.
    pub fn apply(&mut self, update: &RecordUpdate) -> Result<(), LedgerError> {
        if self.status.is_terminal() {
            return Err(LedgerError::IllegalTransition {
                request_id: self.request_id,
                from: self.status,
                to: update.target_status(),
            });
        }

        match update {
            RecordUpdate::Mined {
                block_number,
                confirmations,
            } => {
                self.block_number = Some(*block_number);
                self.confirmations = self.confirmations.max(*confirmations);
            }
            RecordUpdate::Confirmed {
                block_number,
                confirmations,
            } => {
                self.block_number = Some(*block_number);
                self.confirmations = self.confirmations.max(*confirmations);
                self.status = TxStatus::Confirmed;
            }
            RecordUpdate::Failed {
                block_number,
                error,
            } => {
                if block_number.is_some() {
                    self.block_number = *block_number;
                }
                self.error = Some(error.clone());
                self.status = TxStatus::Failed;
            }
        }
        if self.status.is_terminal() {
            self.raw = None;
        }
        self.updated_at = now_secs();
        Ok(())
    }
}

/// A change observed for a Pending record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    /// Included in a block but below the confirmation threshold.
    Mined { block_number: u64, confirmations: u32 },
    Confirmed { block_number: u64, confirmations: u32 },
    Failed {
        block_number: Option<u64>,
        error: ErrorInfo,
    },
}

impl RecordUpdate {
    pub fn target_status(&self) -> TxStatus {
        match self {
            RecordUpdate::Mined { .. } => TxStatus::Pending,
            RecordUpdate::Confirmed { .. } => TxStatus::Confirmed,
            RecordUpdate::Failed { .. } => TxStatus::Failed,
        }
    }
}

/// Last observed token balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBalance {
    pub token: Address,
    pub amount: U256,
    pub updated_at: u64,
}

/// Everything persisted for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub schema_version: u32,
    pub user_id: UserId,
    pub wallet: Option<StoredWallet>,
    /// Highest nonce held by an accepted (or possibly accepted) transaction.
    pub last_nonce: Option<u64>,
    pub cached_balance: Option<CachedBalance>,
    /// Insertion-ordered history.
    pub history: Vec<TransactionRecord>,
    pub created_at: u64,
}

impl UserRecord {
    pub fn new(user_id: UserId) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            user_id,
            wallet: None,
            last_nonce: None,
            cached_balance: None,
            history: Vec::new(),
            created_at: now_secs(),
        }
    }

    /// Recompute `last_nonce` from history.
    pub fn refresh_last_nonce(&mut self) {
        self.last_nonce = self
            .history
            .iter()
            .filter(|r| r.holds_nonce())
            .filter_map(|r| r.nonce)
            .max();
    }
}

/// Errors that can occur in the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ledger record corrupted: {0}")]
    Corrupted(String),

    /// A different wallet is already bound to this user.
    #[error("user {0} already has a different wallet")]
    WalletAlreadyAssigned(UserId),

    #[error("no record {0} in history")]
    RecordNotFound(Uuid),

    #[error("record {request_id} cannot move from {from} to {to}")]
    IllegalTransition {
        request_id: Uuid,
        from: TxStatus,
        to: TxStatus,
    },
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
