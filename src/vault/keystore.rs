//! Sealing and unsealing of private keys.
//!
//! ```text
//! passphrase + header salt ──Argon2id──► master key (memory only)
//! master key ──HKDF-SHA256(info = user id)──► per-user subkey
//! subkey + random 24-byte nonce ──XChaCha20-Poly1305(aad = user id ‖ address)──► SealedKey
//! ```
//!
//! The vault header (`vault.json`) stores the salt, the KDF parameters and a
//! sealed verifier used to reject a wrong passphrase at open time.

use alloy::primitives::{Address, Bytes};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::types::{SealedKey, VaultError, VaultResult};
use crate::config::VaultConfig;
use crate::identity::UserId;

pub const CIPHER_NAME: &str = "xchacha20poly1305";
pub const SEALING_VERSION: u32 = 1;

const HEADER_FILE: &str = "vault.json";
const HKDF_SALT: &[u8] = b"wallet-orchestrator/keystore/v1";
const VERIFIER_INFO: &[u8] = b"vault-verifier";
const VERIFIER_PLAINTEXT: &[u8] = b"wallet-orchestrator vault";
const SECRET_LEN: usize = 32;

/// KDF parameters pinned in the header so later config changes cannot
/// lock users out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl From<&VaultConfig> for KdfParams {
    fn from(config: &VaultConfig) -> Self {
        Self {
            memory_kib: config.kdf_memory_kib,
            iterations: config.kdf_iterations,
            parallelism: config.kdf_parallelism,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultHeader {
    version: u32,
    salt: Bytes,
    kdf: KdfParams,
    verifier: SealedKey,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterKey([u8; 32]);

impl MasterKey {
    fn derive(passphrase: &str, salt: &[u8], params: KdfParams) -> VaultResult<Self> {
        use argon2::{Algorithm, Argon2, Params, Version};

        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(32),
        )
        .map_err(|e| VaultError::Storage(format!("argon2 params: {e}")))?;

        let mut key = [0u8; 32];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| VaultError::Storage(format!("argon2: {e}")))?;
        Ok(MasterKey(key))
    }

    fn subkey(&self, info: &[u8]) -> VaultResult<SubKey> {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), &self.0);
        let mut key = [0u8; 32];
        hk.expand(info, &mut key)
            .map_err(|e| VaultError::KeyCorrupted(format!("hkdf: {e}")))?;
        Ok(SubKey(key))
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct SubKey([u8; 32]);

impl SubKey {
    fn seal(&self, plaintext: &[u8], aad: &[u8]) -> VaultResult<SealedKey> {
        let cipher = XChaCha20Poly1305::new((&self.0).into());
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad })
            .map_err(|_| VaultError::KeyCorrupted("encryption failed".to_string()))?;

        Ok(SealedKey {
            cipher: CIPHER_NAME.to_string(),
            nonce: Bytes::copy_from_slice(nonce.as_slice()),
            ciphertext: Bytes::from(ciphertext),
        })
    }

    fn open(&self, sealed: &SealedKey, aad: &[u8]) -> VaultResult<Zeroizing<Vec<u8>>> {
        if sealed.cipher != CIPHER_NAME {
            return Err(VaultError::KeyCorrupted(format!(
                "unsupported cipher {}",
                sealed.cipher
            )));
        }
        if sealed.nonce.len() != 24 {
            return Err(VaultError::KeyCorrupted(format!(
                "nonce length {}",
                sealed.nonce.len()
            )));
        }

        let cipher = XChaCha20Poly1305::new((&self.0).into());
        let nonce = XNonce::from_slice(&sealed.nonce);
        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: sealed.ciphertext.as_ref(),
                    aad,
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| VaultError::KeyCorrupted("authentication failed".to_string()))
    }
}

/// Holds the master key for the lifetime of the vault.
pub struct Keystore {
    master: MasterKey,
    header_path: PathBuf,
}

impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystore")
            .field("header_path", &self.header_path)
            .finish_non_exhaustive()
    }
}

impl Keystore {
    /// Open the keystore under `data_dir`, creating the header on first use.
    pub fn open_or_init(
        data_dir: &Path,
        passphrase: &str,
        config: &VaultConfig,
    ) -> VaultResult<Self> {
        if passphrase.is_empty() {
            return Err(VaultError::MissingPassphrase(config.passphrase_env.clone()));
        }
        std::fs::create_dir_all(data_dir)
            .map_err(|e| VaultError::Storage(format!("{}: {e}", data_dir.display())))?;

        let header_path = data_dir.join(HEADER_FILE);
        match std::fs::read(&header_path) {
            Ok(bytes) => {
                let header: VaultHeader = serde_json::from_slice(&bytes)
                    .map_err(|e| VaultError::Storage(format!("vault header: {e}")))?;
                let master = MasterKey::derive(passphrase, &header.salt, header.kdf)?;
                master
                    .subkey(VERIFIER_INFO)?
                    .open(&header.verifier, VERIFIER_PLAINTEXT)
                    .map_err(|_| VaultError::InvalidPassphrase)?;

                tracing::info!(path = %header_path.display(), "Vault unlocked");
                Ok(Self {
                    master,
                    header_path,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut salt = [0u8; 16];
                rand::rngs::OsRng.fill_bytes(&mut salt);
                let kdf = KdfParams::from(config);
                let master = MasterKey::derive(passphrase, &salt, kdf)?;
                let verifier = master
                    .subkey(VERIFIER_INFO)?
                    .seal(VERIFIER_PLAINTEXT, VERIFIER_PLAINTEXT)?;

                let header = VaultHeader {
                    version: SEALING_VERSION,
                    salt: Bytes::copy_from_slice(&salt),
                    kdf,
                    verifier,
                };
                write_header(&header_path, &header)?;

                tracing::info!(path = %header_path.display(), "Vault initialized");
                Ok(Self {
                    master,
                    header_path,
                })
            }
            Err(e) => Err(VaultError::Storage(format!(
                "{}: {e}",
                header_path.display()
            ))),
        }
    }

    /// Encrypt a private key for `user`, bound to `address`.
    pub fn seal(
        &self,
        user: &UserId,
        address: Address,
        secret: &[u8; SECRET_LEN],
    ) -> VaultResult<SealedKey> {
        self.user_key(user)?.seal(secret, &associated_data(user, address))
    }

    /// Decrypt a private key. Fails with `KeyCorrupted` if the record was
    /// tampered with or moved to another user or address.
    pub fn unseal(
        &self,
        user: &UserId,
        address: Address,
        sealed: &SealedKey,
    ) -> VaultResult<Zeroizing<[u8; SECRET_LEN]>> {
        let plain = self
            .user_key(user)?
            .open(sealed, &associated_data(user, address))?;
        if plain.len() != SECRET_LEN {
            return Err(VaultError::KeyCorrupted(format!(
                "key length {}",
                plain.len()
            )));
        }

        let mut secret = Zeroizing::new([0u8; SECRET_LEN]);
        secret.copy_from_slice(&plain);
        Ok(secret)
    }

    fn user_key(&self, user: &UserId) -> VaultResult<SubKey> {
        self.master
            .subkey(format!("user:{}", user.as_str()).as_bytes())
    }
}

fn associated_data(user: &UserId, address: Address) -> Vec<u8> {
    let mut aad = Vec::with_capacity(user.as_str().len() + 1 + 20);
    aad.extend_from_slice(user.as_str().as_bytes());
    aad.push(0);
    aad.extend_from_slice(address.as_slice());
    aad
}

fn write_header(path: &Path, header: &VaultHeader) -> VaultResult<()> {
    let bytes = serde_json::to_vec_pretty(header)
        .map_err(|e| VaultError::Storage(format!("vault header: {e}")))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)
        .map_err(|e| VaultError::Storage(format!("{}: {e}", tmp.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| VaultError::Storage(format!("{}: {e}", tmp.display())))?;
    }

    std::fs::rename(&tmp, path)
        .map_err(|e| VaultError::Storage(format!("{}: {e}", path.display())))
}
