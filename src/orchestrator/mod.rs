//! Transaction orchestrator.
//!
//! # Data Flow
//! ```text
//! deposit / claim_reward (per-user write lock)
//!     → vault.get_or_create
//!     → nonce.rs   max(ledger last + 1, chain pending count)
//!     → gas.rs     estimate (refusal → Failed record, nothing sent) + price buffer
//!     → vault.sign
//!     → submit.rs  bounded retries with the same bytes; "already known" = accepted,
//!                  "nonce too low" with our receipt on chain = accepted
//!     → ledger     Pending record
//!     → confirm.rs poll receipt until deep enough or timeout (stays Pending)
//!     → ledger     Confirmed / Failed
//!
//! get_balance / history (no write lock)
//!     → reconcile Pending records → chain read → ledger cache
//!
//! reconcile (Pending record the node does not know)
//!     → nonce still open: resend the stored signed bytes
//!     → nonce taken elsewhere: Failed, nonce released
//! ```
//!
//! # Design Decisions
//! - A nonce conflict is retried exactly once with a fresh nonce, as a new record
//! - A submit timeout is never treated as success or failure
//! - A lost connection while polling is not a failed transaction

pub mod confirm;
pub mod engine;
pub mod gas;
pub mod nonce;
pub mod reconcile;
pub mod request;
pub mod submit;

pub use confirm::Observation;
pub use engine::{Orchestrator, WalletInfo};
pub use reconcile::Reconciler;
pub use request::{GasParams, PlannedCall, TransactionRequest};
pub use submit::SubmitOutcome;
