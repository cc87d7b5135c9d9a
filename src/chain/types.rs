//! Chain-specific types and error definitions.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use crate::config::schema::ChainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

/// Why a node refused a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Nonce already used by a mined transaction.
    NonceTooLow,
    /// The exact same signed transaction is already in the node's pool.
    AlreadyKnown,
    /// Sender cannot cover value + gas.
    InsufficientFunds,
    /// Execution (or simulation) reverted.
    Reverted,
    /// Gas price below the pool's replacement/minimum threshold.
    Underpriced,
    /// Network gas price above the configured ceiling.
    GasPriceTooHigh,
    Other,
}

impl RejectReason {
    /// Classify a node error message.
    pub fn from_message(message: &str) -> Self {
        let msg = message.to_ascii_lowercase();
        if msg.contains("nonce too low") || msg.contains("nonce has already been used") {
            RejectReason::NonceTooLow
        } else if msg.contains("already known") || msg.contains("known transaction") {
            RejectReason::AlreadyKnown
        } else if msg.contains("revert") {
            RejectReason::Reverted
        } else if msg.contains("insufficient funds") {
            RejectReason::InsufficientFunds
        } else if msg.contains("underpriced") {
            RejectReason::Underpriced
        } else {
            RejectReason::Other
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::NonceTooLow => "nonce too low",
            RejectReason::AlreadyKnown => "already known",
            RejectReason::InsufficientFunds => "insufficient funds",
            RejectReason::Reverted => "execution reverted",
            RejectReason::Underpriced => "underpriced",
            RejectReason::GasPriceTooHigh => "gas price too high",
            RejectReason::Other => "rejected",
        };
        f.write_str(s)
    }
}

/// JSON-RPC code geth uses for reverts carrying revert data.
const REVERT_WITH_DATA: i64 = 3;

/// Messages of `-32000` errors that judge the transaction itself.
const VALIDITY_MESSAGES: &[&str] = &[
    "intrinsic gas too low",
    "gas required exceeds allowance",
    "exceeds block gas limit",
    "max fee per gas less than block base fee",
    "invalid sender",
];

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC connection or transport failure. Transient.
    #[error("RPC error: {0}")]
    Network(String),

    /// RPC request timed out; the outcome is unknown.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The node refused the request on semantic grounds.
    #[error("rejected by node ({reason}): {message}")]
    Rejected {
        reason: RejectReason,
        message: String,
    },

    /// The node answered with something we could not decode.
    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}

impl ChainError {
    /// Build a rejection from a node error message.
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        ChainError::Rejected {
            reason: RejectReason::from_message(&message),
            message,
        }
    }

    /// Classify a JSON-RPC error response.
    ///
    /// Only verdicts on the transaction become `Rejected`. Provider trouble
    /// (rate limits, internal errors, missing state) is `Network`, so it is
    /// retried and sent to the next provider.
    pub fn from_rpc(code: i64, message: &str) -> Self {
        let reason = RejectReason::from_message(message);
        let lower = message.to_ascii_lowercase();
        let verdict = reason != RejectReason::Other
            || code == REVERT_WITH_DATA
            || (code == -32000 && VALIDITY_MESSAGES.iter().any(|m| lower.contains(m)));

        if !verdict {
            return ChainError::Network(format!("RPC error {code}: {message}"));
        }
        ChainError::Rejected {
            reason: if code == REVERT_WITH_DATA {
                RejectReason::Reverted
            } else {
                reason
            },
            message: message.to_string(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Network(_) | ChainError::InvalidResponse(_))
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            ChainError::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Short label used for metrics.
    pub fn class(&self) -> &'static str {
        match self {
            ChainError::Network(_) => "network",
            ChainError::Timeout(_) => "timeout",
            ChainError::Rejected { .. } => "rejected",
            ChainError::InvalidResponse(_) => "invalid_response",
            ChainError::ChainMismatch { .. } => "chain_mismatch",
        }
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// A read-only or simulated contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl CallRequest {
    pub fn new(from: Address, to: Address, data: Bytes) -> Self {
        Self {
            from,
            to,
            data,
            value: U256::ZERO,
        }
    }
}

/// A legacy (EIP-155) transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

/// A signed, RLP/2718-encoded transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: TxHash,
    pub from: Address,
    pub nonce: u64,
    pub raw: Bytes,
}

/// Mined transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
    pub gas_used: u64,
}

/// Result of a receipt lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptLookup {
    /// Included in a block.
    Mined(Receipt),
    /// Known to the node but not yet mined.
    Pending,
    /// Unknown to the node.
    NotFound,
}
