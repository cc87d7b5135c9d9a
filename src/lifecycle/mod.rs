//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → logging/metrics → ledger → vault (passphrase from env)
//!         → chain client → orchestrator → WalletService
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → reconciler and watch loops stop
//! ```
//!
//! # Design Decisions
//! - Fail fast: a vault that cannot be unlocked is fatal
//! - An unreachable RPC endpoint is not fatal; calls fail individually

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_on_signal;
pub use startup::{start, start_with};
