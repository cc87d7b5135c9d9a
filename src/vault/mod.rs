//! Key vault: sole owner of private keys.
//!
//! # Data Flow
//! ```text
//! get_or_create(user)
//!     → per-user lock
//!     → ledger.load → unseal + address check      (existing wallet)
//!     → OsRng → secp256k1 key → seal → ledger.save (first use)
//!
//! sign(user, tx)
//!     → ledger.load → unseal → PrivateKeySigner (scoped) → raw EIP-2718 bytes
//! ```
//!
//! # Security Constraints
//! - Keys are sealed per user; a record copied to another user fails to open
//! - Plaintext key material is zeroed on every exit path
//! - The passphrase comes from the environment and never reaches the logs

pub mod key_vault;
pub mod keystore;
pub mod types;

pub use key_vault::KeyVault;
pub use keystore::{KdfParams, Keystore};
pub use types::{
    DerivationMeta, SealedKey, StoredWallet, VaultError, VaultResult, Wallet, KEY_SCHEME,
};
