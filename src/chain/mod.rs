//! Chain client adapter: the only network egress.
//!
//! # Data Flow
//! ```text
//! orchestrator
//!     → contracts.rs (ABI-encode approve / deposit / claimReward / views)
//!     → client.rs (ChainClient trait; RpcChainClient with timeouts + failover)
//!     → JSON-RPC endpoint
//! ```
//!
//! # Security Constraints
//! - Only signed raw transactions leave the process; keys never reach this layer
//! - Every RPC call has a configurable timeout
//! - Node rejections are classified, never retried blindly here

pub mod client;
pub mod contracts;
pub mod types;

pub use client::{ChainClient, RpcChainClient};
pub use types::{
    CallRequest, ChainError, ChainId, ChainResult, Receipt, ReceiptLookup, RejectReason,
    SignedTransaction, UnsignedTransaction,
};
