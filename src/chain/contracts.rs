//! ABI definitions and call encoding for the fixed contracts.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::chain::types::{ChainError, ChainResult};

sol! {
    /// ERC-20 token used for deposits and rewards.
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }

    /// Vault holding deposited funds.
    interface IVault {
        function deposit(uint256 amount) external;
    }

    /// Reward pool paying out per-epoch rewards.
    interface IRewardPool {
        function claimReward(uint256 epochId, uint256 userScore, bytes signature) external;
        function calculateReward(uint256 epochId, uint256 userScore) external view returns (uint256);
    }
}

pub fn encode_balance_of(owner: Address) -> Bytes {
    IERC20::balanceOfCall { owner }.abi_encode().into()
}

pub fn encode_allowance(owner: Address, spender: Address) -> Bytes {
    IERC20::allowanceCall { owner, spender }.abi_encode().into()
}

pub fn encode_approve(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

pub fn encode_deposit(amount: U256) -> Bytes {
    IVault::depositCall { amount }.abi_encode().into()
}

pub fn encode_claim_reward(epoch_id: U256, user_score: U256, signature: Bytes) -> Bytes {
    IRewardPool::claimRewardCall {
        epochId: epoch_id,
        userScore: user_score,
        signature,
    }
    .abi_encode()
    .into()
}

pub fn encode_calculate_reward(epoch_id: U256, user_score: U256) -> Bytes {
    IRewardPool::calculateRewardCall {
        epochId: epoch_id,
        userScore: user_score,
    }
    .abi_encode()
    .into()
}

/// Decode a single `uint256` return word.
pub fn decode_uint(data: &[u8]) -> ChainResult<U256> {
    if data.len() < 32 {
        return Err(ChainError::InvalidResponse(format!(
            "expected 32-byte uint256 return, got {} bytes",
            data.len()
        )));
    }
    Ok(U256::from_be_slice(&data[..32]))
}

/// Encode a single `uint256` return word (the inverse of [`decode_uint`]).
pub fn encode_uint(value: U256) -> Bytes {
    Bytes::from(value.to_be_bytes::<32>().to_vec())
}
