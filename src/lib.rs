//! Multi-user wallet identity and transaction orchestration.
//!
//! # Architecture Overview
//!
//! ```text
//!   presentation (CLI / UI)
//!          │
//!          ▼
//!   ┌──────────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐
//!   │   identity   │──▶│  vault   │──▶│ orchestrator │──▶│  chain   │──▶ JSON-RPC
//!   │  resolver    │   │ (keys)   │   │ nonce/gas/   │   │ adapter  │
//!   └──────────────┘   └────┬─────┘   │ submit/poll  │   └──────────┘
//!                           │         └──────┬───────┘
//!                           ▼                ▼
//!                      ┌─────────────────────────┐
//!                      │  ledger (per-user JSON) │
//!                      └─────────────────────────┘
//!
//!   cross-cutting: config, resilience (retry/backoff), observability,
//!                  lifecycle (startup/shutdown), locks (per-user mutexes)
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod locks;
pub mod observability;
pub mod orchestrator;
pub mod resilience;
pub mod service;
pub mod vault;

pub use config::AppConfig;
pub use error::{ErrorInfo, ErrorKind, WalletError, WalletResult};
pub use lifecycle::Shutdown;
pub use service::WalletService;
