//! Transaction requests: what the orchestrator signs and submits.

use alloy::primitives::{Address, Bytes, U256};
use uuid::Uuid;

use crate::chain::contracts;
use crate::chain::{SignedTransaction, UnsignedTransaction};
use crate::error::ErrorInfo;
use crate::ledger::{OperationKind, TransactionRecord};

/// A contract call the user asked for, before nonce and gas are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCall {
    pub kind: OperationKind,
    pub target: Address,
    pub amount: Option<U256>,
    pub data: Bytes,
}

impl PlannedCall {
    /// `token.approve(spender, amount)`.
    pub fn approve(token: Address, spender: Address, amount: U256) -> Self {
        Self {
            kind: OperationKind::Approve,
            target: token,
            amount: Some(amount),
            data: contracts::encode_approve(spender, amount),
        }
    }

    /// `vault.deposit(amount)`.
    pub fn deposit(vault: Address, amount: U256) -> Self {
        Self {
            kind: OperationKind::Deposit,
            target: vault,
            amount: Some(amount),
            data: contracts::encode_deposit(amount),
        }
    }

    /// `pool.claimReward(epochId, score, attestation)`.
    pub fn claim_reward(pool: Address, epoch_id: u64, score: u64, attestation: Bytes) -> Self {
        Self {
            kind: OperationKind::ClaimReward,
            target: pool,
            amount: None,
            data: contracts::encode_claim_reward(
                U256::from(epoch_id),
                U256::from(score),
                attestation,
            ),
        }
    }
}

/// Gas settings chosen for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasParams {
    pub gas_price: u128,
    pub gas_limit: u64,
}

/// A fully specified transaction. Immutable once submitted; a retry builds
/// a new request that points back at this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub request_id: Uuid,
    pub kind: OperationKind,
    pub from: Address,
    pub target: Address,
    pub amount: Option<U256>,
    pub data: Bytes,
    pub nonce: u64,
    pub gas: GasParams,
    pub retry_of: Option<Uuid>,
}

impl TransactionRequest {
    pub fn to_unsigned(&self, chain_id: u64) -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id,
            nonce: self.nonce,
            gas_price: self.gas.gas_price,
            gas_limit: self.gas.gas_limit,
            to: self.target,
            value: U256::ZERO,
            input: self.data.clone(),
        }
    }

    /// Record for a broadcast of `signed`, keeping its bytes for resending.
    pub fn pending_record(&self, signed: &SignedTransaction) -> TransactionRecord {
        TransactionRecord::pending(
            self.request_id,
            self.kind,
            self.from,
            self.target,
            self.amount,
            self.nonce,
            signed.hash,
        )
        .with_retry_of(self.retry_of)
        .with_raw(signed.raw.clone())
    }

    pub fn failed_record(&self, error: ErrorInfo) -> TransactionRecord {
        TransactionRecord::failed(
            self.request_id,
            self.kind,
            self.from,
            self.target,
            self.amount,
            Some(self.nonce),
            error,
        )
        .with_retry_of(self.retry_of)
    }
}
