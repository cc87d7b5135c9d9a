//! Top-level error taxonomy.
//!
//! Component errors convert into [`WalletError`]; callers and stored records
//! see only the [`ErrorKind`] classification plus a human-readable cause.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::chain::{ChainError, RejectReason};
use crate::config::ConfigError;
use crate::identity::{IdentityError, UserId};
use crate::ledger::LedgerError;
use crate::vault::VaultError;

/// Serializable failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    IdentityUnavailable,
    WalletNotFound,
    KeyCorrupted,
    StorageUnavailable,
    NetworkError,
    ChainRejected,
    InsufficientFunds,
    Timeout,
    InvalidRequest,
    RateLimited,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::IdentityUnavailable => "identity_unavailable",
            ErrorKind::WalletNotFound => "wallet_not_found",
            ErrorKind::KeyCorrupted => "key_corrupted",
            ErrorKind::StorageUnavailable => "storage_unavailable",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::ChainRejected => "chain_rejected",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification plus cause, as stored on records and shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub cause: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.cause)
    }
}

/// Errors surfaced by the wallet core.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("identity unavailable: {0}")]
    IdentityUnavailable(String),

    #[error("no wallet exists for user {0}")]
    WalletNotFound(UserId),

    #[error("key material corrupted: {0}")]
    KeyCorrupted(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rejected by chain: {0}")]
    ChainRejected(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Seconds until the next attempt is allowed.
    #[error("rate limited; retry in {0}s")]
    RateLimited(u64),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::IdentityUnavailable(_) => ErrorKind::IdentityUnavailable,
            WalletError::WalletNotFound(_) => ErrorKind::WalletNotFound,
            WalletError::KeyCorrupted(_) => ErrorKind::KeyCorrupted,
            WalletError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            WalletError::Network(_) => ErrorKind::NetworkError,
            WalletError::ChainRejected(_) => ErrorKind::ChainRejected,
            WalletError::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            WalletError::Timeout(_) => ErrorKind::Timeout,
            WalletError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            WalletError::RateLimited(_) => ErrorKind::RateLimited,
        }
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.to_string())
    }
}

impl From<IdentityError> for WalletError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Unavailable => WalletError::IdentityUnavailable(err.to_string()),
            IdentityError::InvalidUserId(_) => WalletError::InvalidRequest(err.to_string()),
        }
    }
}

impl From<VaultError> for WalletError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::WalletNotFound(user) => WalletError::WalletNotFound(user),
            VaultError::KeyCorrupted(msg) => WalletError::KeyCorrupted(msg),
            VaultError::InvalidPassphrase => WalletError::KeyCorrupted(err.to_string()),
            VaultError::Storage(_) | VaultError::MissingPassphrase(_) => {
                WalletError::StorageUnavailable(err.to_string())
            }
        }
    }
}

impl WalletError {
    /// Classify a chain error without consuming it.
    pub fn from_chain(err: &ChainError) -> Self {
        match err {
            ChainError::Network(_) | ChainError::InvalidResponse(_) => {
                WalletError::Network(err.to_string())
            }
            ChainError::Timeout(_) => WalletError::Timeout(err.to_string()),
            ChainError::Rejected {
                reason: RejectReason::InsufficientFunds,
                ..
            } => WalletError::InsufficientFunds(err.to_string()),
            ChainError::Rejected { .. } | ChainError::ChainMismatch { .. } => {
                WalletError::ChainRejected(err.to_string())
            }
        }
    }
}

impl From<ChainError> for WalletError {
    fn from(err: ChainError) -> Self {
        WalletError::from_chain(&err)
    }
}

impl From<LedgerError> for WalletError {
    fn from(err: LedgerError) -> Self {
        WalletError::StorageUnavailable(err.to_string())
    }
}

impl From<ConfigError> for WalletError {
    fn from(err: ConfigError) -> Self {
        WalletError::InvalidRequest(err.to_string())
    }
}

/// Result type for wallet operations.
pub type WalletResult<T> = Result<T, WalletError>;
