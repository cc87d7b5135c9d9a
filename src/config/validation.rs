//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, multipliers >= 1)
//! - Require the contract addresses the operations depend on
//!
//! Returns all validation errors, not just the first.

use alloy::primitives::{hex, Address};
use std::fmt;

use crate::config::schema::AppConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.chain.rpc_url.parse::<url::Url>().is_err() {
        errors.push(ValidationError::new("chain.rpc_url", "not a valid URL"));
    }
    if config.chain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.rpc_timeout_secs", "must be > 0"));
    }
    if !(config.chain.gas_price_multiplier >= 1.0) {
        errors.push(ValidationError::new("chain.gas_price_multiplier", "must be >= 1.0"));
    }
    if !(config.chain.gas_limit_multiplier >= 1.0) {
        errors.push(ValidationError::new("chain.gas_limit_multiplier", "must be >= 1.0"));
    }
    if config.chain.max_gas_price_gwei == 0 {
        errors.push(ValidationError::new("chain.max_gas_price_gwei", "must be > 0"));
    }

    let contracts = [
        ("contracts.token", config.contracts.token),
        ("contracts.vault", config.contracts.vault),
        ("contracts.reward_pool", config.contracts.reward_pool),
    ];
    for (field, address) in contracts {
        if address == Address::ZERO {
            errors.push(ValidationError::new(field, "contract address must be set"));
        }
    }

    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    if config.confirmation.confirmation_blocks == 0 {
        errors.push(ValidationError::new("confirmation.confirmation_blocks", "must be >= 1"));
    }
    if config.confirmation.poll_interval_ms == 0 {
        errors.push(ValidationError::new("confirmation.poll_interval_ms", "must be > 0"));
    }
    if config.confirmation.timeout_secs == 0 {
        errors.push(ValidationError::new("confirmation.timeout_secs", "must be > 0"));
    }

    if config.vault.passphrase_env.trim().is_empty() {
        errors.push(ValidationError::new("vault.passphrase_env", "must name an environment variable"));
    }
    if config.vault.kdf_parallelism == 0 || config.vault.kdf_iterations == 0 {
        errors.push(ValidationError::new("vault", "kdf iterations and parallelism must be > 0"));
    }
    if config.vault.kdf_memory_kib < 8 * config.vault.kdf_parallelism {
        errors.push(ValidationError::new(
            "vault.kdf_memory_kib",
            "must be at least 8 KiB per lane",
        ));
    }

    if hex::decode(&config.rewards.attestation).is_err() {
        errors.push(ValidationError::new("rewards.attestation", "must be hex-encoded bytes"));
    }

    if !matches!(config.observability.log_format.as_str(), "compact" | "pretty") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be \"compact\" or \"pretty\"",
        ));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
