//! Identity types and errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum length of a user identifier.
pub const MAX_USER_ID_LEN: usize = 64;

/// Locally-unique user identifier.
///
/// Restricted to `[A-Za-z0-9_-]` so it can key a per-user storage file directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a raw identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, IdentityError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_USER_ID_LEN {
            return Err(IdentityError::InvalidUserId(format!(
                "length must be 1..={} characters",
                MAX_USER_ID_LEN
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(IdentityError::InvalidUserId(format!(
                "'{}' contains characters outside [A-Za-z0-9_-]",
                raw
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Where an identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    DeviceFingerprint,
    ExplicitLogin,
}

/// A resolved user identity. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Opaque stable string derived from device attributes (or the login for
    /// explicit identities).
    pub device_fingerprint: String,
    pub user_id: UserId,
    pub source: IdentitySource,
}

/// Errors raised while resolving an identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No stable device signal could be gathered.
    #[error("no stable device signal available; supply an explicit user identifier")]
    Unavailable,

    /// The supplied identifier is not usable as a user key.
    #[error("invalid user identifier: {0}")]
    InvalidUserId(String),
}
