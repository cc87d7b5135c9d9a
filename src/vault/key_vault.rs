//! Per-user wallet creation and transaction signing.
//!
//! # Security
//! - Private keys come only from the OS entropy source
//! - Keys are persisted sealed, never in cleartext, and are never logged
//! - Plaintext key bytes live in `Zeroizing` buffers scoped to one call

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind};
use alloy::signers::local::PrivateKeySigner;
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;
use zeroize::Zeroizing;

use super::keystore::{Keystore, SEALING_VERSION};
use super::types::{
    DerivationMeta, StoredWallet, VaultError, VaultResult, Wallet, KEY_SCHEME,
};
use crate::chain::{SignedTransaction, UnsignedTransaction};
use crate::config::VaultConfig;
use crate::identity::UserId;
use crate::ledger::types::now_secs;
use crate::ledger::UserLedger;
use crate::locks::KeyedLocks;
use crate::observability::metrics;

/// Attempts at drawing a valid secp256k1 scalar before giving up.
const KEYGEN_ATTEMPTS: usize = 4;

/// Owns every user's key material.
#[derive(Debug)]
pub struct KeyVault {
    keystore: Keystore,
    ledger: UserLedger,
    locks: KeyedLocks<UserId>,
}

impl KeyVault {
    /// Unlock the vault under `data_dir`. Wallet records are kept in `ledger`.
    pub fn open(
        config: &VaultConfig,
        data_dir: &Path,
        passphrase: &str,
        ledger: UserLedger,
    ) -> VaultResult<Self> {
        let keystore = Keystore::open_or_init(data_dir, passphrase, config)?;
        Ok(Self {
            keystore,
            ledger,
            locks: KeyedLocks::new(),
        })
    }

    /// Unlock the vault with the passphrase from `config.passphrase_env`.
    pub fn open_from_env(
        config: &VaultConfig,
        data_dir: &Path,
        ledger: UserLedger,
    ) -> VaultResult<Self> {
        let passphrase = Zeroizing::new(
            std::env::var(&config.passphrase_env)
                .map_err(|_| VaultError::MissingPassphrase(config.passphrase_env.clone()))?,
        );
        Self::open(config, data_dir, &passphrase, ledger)
    }

    /// Return the user's wallet, creating it on first use.
    ///
    /// Concurrent calls for one user create at most one wallet.
    pub async fn get_or_create(&self, user: &UserId) -> VaultResult<Wallet> {
        let _guard = self.locks.lock(user).await;

        if let Some(stored) = self.load_stored(user).await? {
            self.check_integrity(user, &stored)?;
            return Ok(stored.to_wallet(user));
        }

        let (secret, address) = generate_key()?;
        let sealed = self.keystore.seal(user, address, &secret)?;
        drop(secret);

        let stored = StoredWallet {
            address,
            derivation: DerivationMeta {
                scheme: KEY_SCHEME.to_string(),
                key_version: SEALING_VERSION,
                created_at: now_secs(),
            },
            sealed_key: sealed,
        };
        self.ledger
            .save(user, stored.clone())
            .await
            .map_err(|e| VaultError::Storage(e.to_string()))?;

        metrics::record_wallet_created();
        tracing::info!(user_id = %user, address = %address, "Wallet created");
        Ok(stored.to_wallet(user))
    }

    /// Return the user's wallet without creating one.
    pub async fn get(&self, user: &UserId) -> VaultResult<Wallet> {
        let stored = self
            .load_stored(user)
            .await?
            .ok_or_else(|| VaultError::WalletNotFound(user.clone()))?;
        Ok(stored.to_wallet(user))
    }

    /// Sign a legacy transaction with the user's key.
    pub async fn sign(
        &self,
        user: &UserId,
        tx: &UnsignedTransaction,
    ) -> VaultResult<SignedTransaction> {
        let stored = self
            .load_stored(user)
            .await?
            .ok_or_else(|| VaultError::WalletNotFound(user.clone()))?;
        let signer = self.signer_for(user, &stored)?;

        let mut legacy = TxLegacy {
            chain_id: Some(tx.chain_id),
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: TxKind::Call(tx.to),
            value: tx.value,
            input: tx.input.clone(),
        };
        let signature = signer
            .sign_transaction_sync(&mut legacy)
            .map_err(|e| VaultError::KeyCorrupted(format!("signing failed: {e}")))?;
        drop(signer);

        let signed = legacy.into_signed(signature);
        let hash = *signed.hash();
        let raw = TxEnvelope::from(signed).encoded_2718();

        tracing::debug!(user_id = %user, tx_hash = %hash, nonce = tx.nonce, "Transaction signed");
        Ok(SignedTransaction {
            hash,
            from: stored.address,
            nonce: tx.nonce,
            raw: Bytes::from(raw),
        })
    }

    async fn load_stored(&self, user: &UserId) -> VaultResult<Option<StoredWallet>> {
        self.ledger
            .load(user)
            .await
            .map_err(|e| VaultError::Storage(e.to_string()))
    }

    fn check_integrity(&self, user: &UserId, stored: &StoredWallet) -> VaultResult<()> {
        self.signer_for(user, stored).map(drop)
    }

    /// Unseal into a signer whose address must match the stored one. The
    /// plaintext buffer is wiped when this returns.
    fn signer_for(&self, user: &UserId, stored: &StoredWallet) -> VaultResult<PrivateKeySigner> {
        let secret = self
            .keystore
            .unseal(user, stored.address, &stored.sealed_key)?;
        let signer = PrivateKeySigner::from_slice(secret.as_ref())
            .map_err(|e| VaultError::KeyCorrupted(format!("invalid key: {e}")))?;

        if signer.address() != stored.address {
            return Err(VaultError::KeyCorrupted(format!(
                "key does not match address {}",
                stored.address
            )));
        }
        Ok(signer)
    }
}

fn generate_key() -> VaultResult<(Zeroizing<[u8; 32]>, Address)> {
    for _ in 0..KEYGEN_ATTEMPTS {
        let mut secret = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(secret.as_mut());
        if let Ok(signer) = PrivateKeySigner::from_slice(secret.as_ref()) {
            return Ok((secret, signer.address()));
        }
    }
    Err(VaultError::KeyCorrupted(
        "entropy source produced no valid key".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Arc;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("vault-test-{}", Uuid::new_v4()))
    }

    fn open_vault(dir: &Path) -> KeyVault {
        let config = VaultConfig {
            kdf_memory_kib: 64,
            kdf_iterations: 1,
            kdf_parallelism: 1,
            ..Default::default()
        };
        let ledger = UserLedger::open(dir).unwrap();
        KeyVault::open(&config, dir, "test-passphrase", ledger).unwrap()
    }

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let dir = temp_dir();
        let vault = open_vault(&dir);

        let first = vault.get_or_create(&user("alice")).await.unwrap();
        let second = vault.get_or_create(&user("alice")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.derivation.scheme, KEY_SCHEME);

        drop(vault);
        let reopened = open_vault(&dir);
        assert_eq!(reopened.get_or_create(&user("alice")).await.unwrap(), first);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_wallet() {
        let dir = temp_dir();
        let vault = Arc::new(open_vault(&dir));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let vault = vault.clone();
            handles.push(tokio::spawn(async move {
                vault.get_or_create(&user("alice")).await.unwrap().address
            }));
        }
        let mut addresses = HashSet::new();
        for handle in handles {
            addresses.insert(handle.await.unwrap());
        }
        assert_eq!(addresses.len(), 1);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_get_unknown_user() {
        let dir = temp_dir();
        let vault = open_vault(&dir);
        let err = vault.get(&user("nobody")).await.unwrap_err();
        assert!(matches!(err, VaultError::WalletNotFound(_)));

        let tx = UnsignedTransaction {
            chain_id: 11155111,
            nonce: 0,
            gas_price: 1,
            gas_limit: 21_000,
            to: Address::ZERO,
            value: U256::ZERO,
            input: Bytes::new(),
        };
        let err = vault.sign(&user("nobody"), &tx).await.unwrap_err();
        assert!(matches!(err, VaultError::WalletNotFound(_)));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_sign_produces_recoverable_transaction() {
        let dir = temp_dir();
        let vault = open_vault(&dir);
        let wallet = vault.get_or_create(&user("alice")).await.unwrap();

        let tx = UnsignedTransaction {
            chain_id: 11155111,
            nonce: 7,
            gas_price: 2_000_000_000,
            gas_limit: 60_000,
            to: Address::repeat_byte(0x11),
            value: U256::ZERO,
            input: Bytes::from(vec![0xde, 0xad]),
        };
        let signed = vault.sign(&user("alice"), &tx).await.unwrap();
        assert_eq!(signed.from, wallet.address);
        assert_eq!(signed.nonce, 7);
        assert!(!signed.raw.is_empty());

        use alloy::eips::eip2718::Decodable2718;
        let decoded = TxEnvelope::decode_2718(&mut signed.raw.as_ref()).unwrap();
        assert_eq!(*decoded.tx_hash(), signed.hash);
        let legacy = decoded.as_legacy().unwrap();
        let recovered = legacy
            .signature()
            .recover_address_from_prehash(&legacy.signature_hash())
            .unwrap();
        assert_eq!(recovered, wallet.address);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_distinct_users_get_distinct_keys() {
        let dir = temp_dir();
        let vault = open_vault(&dir);

        let mut addresses = HashSet::new();
        for i in 0..64 {
            let wallet = vault.get_or_create(&user(&format!("user-{i}"))).await.unwrap();
            assert!(addresses.insert(wallet.address));
        }

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_tampered_record_is_corrupted() {
        let dir = temp_dir();
        let ledger = UserLedger::open(&dir).unwrap();
        let config = VaultConfig {
            kdf_memory_kib: 64,
            kdf_iterations: 1,
            kdf_parallelism: 1,
            ..Default::default()
        };
        let vault = KeyVault::open(&config, &dir, "pw", ledger.clone()).unwrap();
        vault.get_or_create(&user("alice")).await.unwrap();

        // Graft alice's sealed key onto bob.
        let stolen = ledger.load(&user("alice")).await.unwrap().unwrap();
        ledger.save(&user("bob"), stolen).await.unwrap();

        let err = vault.get_or_create(&user("bob")).await.unwrap_err();
        assert!(matches!(err, VaultError::KeyCorrupted(_)));

        let _ = std::fs::remove_dir_all(dir);
    }
}
