//! Identity resolvers.

use alloy::primitives::hex;
use sha2::{Digest, Sha256};

use crate::identity::signals::DeviceSignals;
use crate::identity::types::{IdentityError, IdentitySource, UserId, UserIdentity};

/// Prefix for identities derived from a device fingerprint.
const DEVICE_ID_PREFIX: &str = "dev-";

/// Hex characters of the fingerprint kept in the user id (128 bits).
const DEVICE_ID_HEX_LEN: usize = 32;

/// Maps raw device signals to a user identity.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, signals: &DeviceSignals) -> Result<UserIdentity, IdentityError>;
}

/// Resolves identities from a SHA-256 hash of stable device attributes.
#[derive(Debug, Clone, Default)]
pub struct DeviceFingerprintResolver;

impl DeviceFingerprintResolver {
    pub fn new() -> Self {
        Self
    }
}

impl IdentityResolver for DeviceFingerprintResolver {
    fn resolve(&self, signals: &DeviceSignals) -> Result<UserIdentity, IdentityError> {
        if !signals.is_identifying() {
            return Err(IdentityError::Unavailable);
        }

        let digest = Sha256::digest(signals.canonical().as_bytes());
        let fingerprint = hex::encode(digest);
        let user_id = UserId::new(format!(
            "{}{}",
            DEVICE_ID_PREFIX,
            &fingerprint[..DEVICE_ID_HEX_LEN]
        ))?;

        Ok(UserIdentity {
            device_fingerprint: fingerprint,
            user_id,
            source: IdentitySource::DeviceFingerprint,
        })
    }
}

/// Resolves a fixed, user-supplied login regardless of device signals.
#[derive(Debug, Clone)]
pub struct ExplicitLoginResolver {
    login: String,
}

impl ExplicitLoginResolver {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
        }
    }
}

impl IdentityResolver for ExplicitLoginResolver {
    fn resolve(&self, _signals: &DeviceSignals) -> Result<UserIdentity, IdentityError> {
        let user_id = UserId::new(self.login.trim())?;
        Ok(UserIdentity {
            device_fingerprint: format!("login:{}", user_id),
            user_id,
            source: IdentitySource::ExplicitLogin,
        })
    }
}
