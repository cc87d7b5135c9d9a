//! Identity resolution subsystem.
//!
//! # Data Flow
//! ```text
//! signals.rs (hostname, OS, user, machine id)
//!     → resolver.rs (SHA-256 fingerprint → UserId)
//!     → UserIdentity (keys the vault and the ledger)
//!
//! No stable signal:
//!     → IdentityError::Unavailable
//!     → caller substitutes ExplicitLoginResolver
//! ```

pub mod resolver;
pub mod signals;
pub mod types;

pub use resolver::{DeviceFingerprintResolver, ExplicitLoginResolver, IdentityResolver};
pub use signals::DeviceSignals;
pub use types::{IdentityError, IdentitySource, UserId, UserIdentity};
