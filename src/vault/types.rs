//! Wallet data model and vault errors.

use alloy::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::UserId;

/// Key generation scheme recorded with every wallet.
pub const KEY_SCHEME: &str = "secp256k1/os-random";

/// How a wallet's key came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationMeta {
    pub scheme: String,
    /// Version of the sealing format.
    pub key_version: u32,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
}

/// Public view of a user's wallet. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub address: Address,
    pub derivation: DerivationMeta,
}

/// A private key encrypted under the user's vault subkey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    pub cipher: String,
    pub nonce: Bytes,
    pub ciphertext: Bytes,
}

/// What the ledger persists for a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredWallet {
    pub address: Address,
    pub derivation: DerivationMeta,
    pub sealed_key: SealedKey,
}

impl StoredWallet {
    pub fn to_wallet(&self, user_id: &UserId) -> Wallet {
        Wallet {
            user_id: user_id.clone(),
            address: self.address,
            derivation: self.derivation.clone(),
        }
    }
}

/// Errors that can occur in the key vault.
#[derive(Debug, Error)]
pub enum VaultError {
    /// `get_or_create` was never called for this user.
    #[error("no wallet exists for user {0}")]
    WalletNotFound(UserId),

    /// Sealed key failed authentication or does not match its address.
    #[error("key material corrupted: {0}")]
    KeyCorrupted(String),

    /// The vault header or the ledger could not be read or written.
    #[error("vault storage unavailable: {0}")]
    Storage(String),

    /// The passphrase does not open this vault.
    #[error("vault passphrase does not match this vault")]
    InvalidPassphrase,

    /// The passphrase environment variable is not set.
    #[error("environment variable {0} not set")]
    MissingPassphrase(String),
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;
