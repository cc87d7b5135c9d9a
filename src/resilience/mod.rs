//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Chain call from the orchestrator:
//!     → client.rs enforces the per-call timeout
//!     → On transient failure: retries.rs (bounded retries)
//!     → backoff.rs (exponential delay with jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - Only transient (network) failures are retried
//! - Node rejections and timeouts are surfaced to the caller untouched
//! - Bounds come from `RetryConfig`, never hidden constants

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::{retry_transient, RetryPolicy, Transient};
