//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the wallet
//! core. All types derive Serde traits for deserialization from config files.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// RPC endpoints and gas policy.
    pub chain: ChainConfig,

    /// Fixed contract addresses.
    pub contracts: ContractsConfig,

    /// Retry policy for transient network failures.
    pub retries: RetryConfig,

    /// Receipt polling policy.
    pub confirmation: ConfirmationConfig,

    /// Key vault settings.
    pub vault: VaultConfig,

    /// Durable state location.
    pub storage: StorageConfig,

    /// Reward claim parameters and policy.
    pub rewards: RewardConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Chain RPC configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs, tried in order.
    pub failover_urls: Vec<String>,

    /// Chain ID (11155111 for Sepolia, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Gas price multiplier (1.0 = node price, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,

    /// Multiplier applied to the node's gas estimate.
    pub gas_limit_multiplier: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://rpc.sepolia.org".to_string(),
            failover_urls: vec!["https://ethereum-sepolia.blockpi.network/v1/rpc/public".to_string()],
            chain_id: 11_155_111,
            rpc_timeout_secs: 10,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
            gas_limit_multiplier: 1.2,
        }
    }
}

/// Addresses of the already-deployed contracts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContractsConfig {
    /// ERC-20 token (balanceOf / approve / allowance).
    pub token: Address,

    /// Vault contract exposing `deposit(uint256)`.
    pub vault: Address,

    /// Reward pool exposing `claimReward(...)`.
    pub reward_pool: Address,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            token: Address::ZERO,
            vault: Address::ZERO,
            reward_pool: Address::ZERO,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt for transient network errors.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// Confirmation polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Blocks (inclusion block counts as one) required before Confirmed.
    pub confirmation_blocks: u32,

    /// Interval between receipt polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Give up polling after this many seconds; the record stays Pending.
    pub timeout_secs: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            confirmation_blocks: 2,
            poll_interval_ms: 2_000,
            timeout_secs: 120,
        }
    }
}

/// Key vault configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Environment variable holding the vault passphrase.
    pub passphrase_env: String,

    /// Argon2id memory cost in KiB.
    pub kdf_memory_kib: u32,

    /// Argon2id iterations.
    pub kdf_iterations: u32,

    /// Argon2id lanes.
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            passphrase_env: "WALLET_VAULT_PASSPHRASE".to_string(),
            kdf_memory_kib: 19 * 1024,
            kdf_iterations: 2,
            kdf_parallelism: 1,
        }
    }
}

/// Durable storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the vault header and per-user records.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("wallet-data"),
        }
    }
}

/// Reward claim configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Epoch the claim is made against.
    pub epoch_id: u64,

    /// Activity score submitted with the claim.
    pub activity_score: u64,

    /// Hex-encoded attestation signature passed to `claimReward`.
    pub attestation: String,

    /// Minimum seconds between two non-failed claims per user (0 = no limit).
    pub min_claim_interval_secs: u64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            epoch_id: 1,
            activity_score: 100,
            attestation: format!("0x{}", "00".repeat(65)),
            min_claim_interval_secs: 0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format: "compact" or "pretty".
    pub log_format: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
