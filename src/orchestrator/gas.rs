//! Gas price and limit policy.

use crate::chain::{ChainError, ChainResult, RejectReason};
use crate::config::ChainConfig;

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Apply the configured buffer to the node's gas price and enforce the
/// ceiling. Exceeding the ceiling is a rejection, before anything is signed.
pub fn buffered_gas_price(base: u128, config: &ChainConfig) -> ChainResult<u128> {
    let price = scale(base, config.gas_price_multiplier);
    let ceiling = u128::from(config.max_gas_price_gwei).saturating_mul(WEI_PER_GWEI);
    if price > ceiling {
        return Err(ChainError::Rejected {
            reason: RejectReason::GasPriceTooHigh,
            message: format!(
                "gas price {} gwei exceeds ceiling of {} gwei",
                price / WEI_PER_GWEI,
                config.max_gas_price_gwei
            ),
        });
    }
    Ok(price)
}

/// Pad a gas estimate.
pub fn buffered_gas_limit(estimate: u64, config: &ChainConfig) -> u64 {
    let scaled = scale(u128::from(estimate), config.gas_limit_multiplier);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

fn scale(value: u128, multiplier: f64) -> u128 {
    // Fixed point at 1/1000 so wei amounts stay in integer arithmetic.
    let per_mille = (multiplier * 1000.0).round() as u128;
    value.saturating_mul(per_mille).div_ceil(1000)
}
