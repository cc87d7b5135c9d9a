//! The transaction orchestrator.
//!
//! Writes for one user run strictly one at a time under that user's lock;
//! different users never wait on each other. Reads take no write lock.

use alloy::primitives::{hex, Address, Bytes, TxHash, U256};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::confirm::{await_confirmation, observe, Observation};
use super::gas::{buffered_gas_limit, buffered_gas_price};
use super::nonce::reconcile_nonce;
use super::request::{GasParams, PlannedCall, TransactionRequest};
use super::submit::{submit_signed, SubmitOutcome};
use crate::chain::contracts;
use crate::chain::{CallRequest, ChainClient, ChainError, RejectReason, SignedTransaction};
use crate::config::AppConfig;
use crate::error::{ErrorInfo, ErrorKind, WalletError, WalletResult};
use crate::identity::UserId;
use crate::ledger::types::now_secs;
use crate::ledger::{
    LedgerError, OperationKind, RecordUpdate, TransactionRecord, TxStatus, UserLedger,
};
use crate::locks::KeyedLocks;
use crate::observability::metrics;
use crate::resilience::{retry_transient, RetryPolicy};
use crate::vault::{KeyVault, VaultError, Wallet};

/// Snapshot of a user's wallet for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletInfo {
    pub user_id: UserId,
    pub address: Address,
    pub chain_id: u64,
    /// Token balance; the cached value when the chain is unreachable.
    pub token_balance: Option<U256>,
    pub balance_is_cached: bool,
    /// Gas-token balance.
    pub native_balance: Option<U256>,
    pub pending_transactions: usize,
}

/// Builds, signs, submits and tracks transactions for every user.
pub struct Orchestrator {
    vault: Arc<KeyVault>,
    chain: Arc<dyn ChainClient>,
    ledger: UserLedger,
    config: Arc<AppConfig>,
    retry: RetryPolicy,
    write_locks: KeyedLocks<UserId>,
}

impl Orchestrator {
    pub fn new(
        vault: Arc<KeyVault>,
        chain: Arc<dyn ChainClient>,
        ledger: UserLedger,
        config: Arc<AppConfig>,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retries);
        Self {
            vault,
            chain,
            ledger,
            config,
            retry,
            write_locks: KeyedLocks::new(),
        }
    }

    pub fn ledger(&self) -> &UserLedger {
        &self.ledger
    }

    pub fn vault(&self) -> &KeyVault {
        &self.vault
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn chain(&self) -> &dyn ChainClient {
        self.chain.as_ref()
    }

    /// Deposit `amount` tokens into the vault contract.
    ///
    /// If the vault's allowance does not cover `amount`, an approval is sent
    /// first and must confirm; otherwise the approval record is returned.
    pub async fn deposit(&self, user: &UserId, amount: U256) -> WalletResult<TransactionRecord> {
        if amount.is_zero() {
            return Err(WalletError::InvalidRequest(
                "deposit amount must be greater than zero".to_string(),
            ));
        }

        let _guard = self.write_locks.lock(user).await;
        let wallet = self.vault.get_or_create(user).await?;
        let contracts = &self.config.contracts;

        let allowance = retry_transient(&self.retry, "get_allowance", || {
            self.chain
                .get_allowance(wallet.address, contracts.vault, contracts.token)
        })
        .await?;

        if allowance < amount {
            tracing::info!(
                user_id = %user,
                allowance = %allowance,
                amount = %amount,
                "Allowance too low, approving vault"
            );
            let approval = self
                .execute(
                    user,
                    &wallet,
                    PlannedCall::approve(contracts.token, contracts.vault, amount),
                )
                .await?;
            if approval.status != TxStatus::Confirmed {
                return Ok(approval);
            }
        }

        let record = self
            .execute(user, &wallet, PlannedCall::deposit(contracts.vault, amount))
            .await?;
        if record.status == TxStatus::Confirmed {
            self.refresh_balance(user, wallet.address).await;
        }
        Ok(record)
    }

    /// Claim the configured epoch's reward.
    pub async fn claim_reward(&self, user: &UserId) -> WalletResult<TransactionRecord> {
        let rewards = &self.config.rewards;
        let attestation = hex::decode(&rewards.attestation)
            .map(Bytes::from)
            .map_err(|e| WalletError::InvalidRequest(format!("reward attestation: {e}")))?;

        let _guard = self.write_locks.lock(user).await;
        self.check_claim_interval(user).await?;
        let wallet = self.vault.get_or_create(user).await?;

        let call = PlannedCall::claim_reward(
            self.config.contracts.reward_pool,
            rewards.epoch_id,
            rewards.activity_score,
            attestation,
        );
        let record = self.execute(user, &wallet, call).await?;
        if record.status == TxStatus::Confirmed {
            self.refresh_balance(user, wallet.address).await;
        }
        Ok(record)
    }

    /// Token balance of the user's wallet. A user without a wallet has zero.
    ///
    /// Pending records are reconciled on the way, without taking the write
    /// lock, so a long-running deposit never delays this call.
    pub async fn get_balance(&self, user: &UserId) -> WalletResult<U256> {
        let wallet = match self.vault.get(user).await {
            Ok(wallet) => wallet,
            Err(VaultError::WalletNotFound(_)) => return Ok(U256::ZERO),
            Err(e) => return Err(e.into()),
        };

        self.reconcile_quietly(user).await;

        let token = self.config.contracts.token;
        let balance = retry_transient(&self.retry, "get_balance", || {
            self.chain.get_balance(wallet.address, token)
        })
        .await?;
        self.ledger.cache_balance(user, token, balance).await?;
        Ok(balance)
    }

    /// The user's records in submission order.
    pub async fn history(&self, user: &UserId) -> WalletResult<Vec<TransactionRecord>> {
        self.reconcile_quietly(user).await;
        Ok(self.ledger.history(user).await?)
    }

    /// What a claim would pay right now, via the pool's view function.
    pub async fn reward_preview(&self, user: &UserId) -> WalletResult<U256> {
        let from = match self.vault.get(user).await {
            Ok(wallet) => wallet.address,
            Err(VaultError::WalletNotFound(_)) => Address::ZERO,
            Err(e) => return Err(e.into()),
        };

        let rewards = &self.config.rewards;
        let call = CallRequest::new(
            from,
            self.config.contracts.reward_pool,
            contracts::encode_calculate_reward(
                U256::from(rewards.epoch_id),
                U256::from(rewards.activity_score),
            ),
        );
        let output = retry_transient(&self.retry, "calculate_reward", || self.chain.call(&call))
            .await?;
        Ok(contracts::decode_uint(&output)?)
    }

    /// Address, balances and pending count. Creates the wallet if needed.
    pub async fn wallet_info(&self, user: &UserId) -> WalletResult<WalletInfo> {
        let wallet = self.vault.get_or_create(user).await?;
        let token = self.config.contracts.token;

        let live = retry_transient(&self.retry, "get_balance", || {
            self.chain.get_balance(wallet.address, token)
        })
        .await;
        let (token_balance, balance_is_cached) = match live {
            Ok(balance) => {
                self.ledger.cache_balance(user, token, balance).await?;
                (Some(balance), false)
            }
            Err(e) => {
                tracing::warn!(user_id = %user, error = %e, "Live balance unavailable, using cache");
                let cached = self
                    .ledger
                    .cached_balance(user)
                    .await?
                    .filter(|c| c.token == token)
                    .map(|c| c.amount);
                (cached, true)
            }
        };

        let native_balance = match self.chain.get_native_balance(wallet.address).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                tracing::warn!(user_id = %user, error = %e, "Native balance unavailable");
                None
            }
        };

        Ok(WalletInfo {
            user_id: user.clone(),
            address: wallet.address,
            chain_id: self.chain.chain_id(),
            token_balance,
            balance_is_cached,
            native_balance,
            pending_transactions: self.ledger.pending(user).await?.len(),
        })
    }

    /// Re-check every Pending record of `user` once. Returns how many moved
    /// to a terminal state.
    pub async fn reconcile_pending(&self, user: &UserId) -> WalletResult<usize> {
        let pending = self.ledger.pending(user).await?;
        let mut settled = 0;

        for record in pending {
            let Some(hash) = record.hash else { continue };
            let observation =
                observe(self.chain.as_ref(), hash, self.config.confirmation.confirmation_blocks)
                    .await?;
            let update = match observation {
                Observation::Missing => self.resolve_missing(user, &record, hash).await?,
                other => other.to_update(),
            };
            let Some(update) = update else {
                continue;
            };
            if let Some(updated) = self.apply_update(user, record.request_id, update).await? {
                if updated.status.is_terminal() {
                    settled += 1;
                    metrics::record_outcome(updated.kind.as_str(), updated.status.as_str());
                    tracing::info!(
                        user_id = %user,
                        request_id = %updated.request_id,
                        tx_hash = %hash,
                        status = %updated.status,
                        "Pending transaction reconciled"
                    );
                }
            }
        }
        Ok(settled)
    }

    /// A Pending record the node does not know. While its nonce is still
    /// open the exact signed bytes are sent again; once another transaction
    /// has taken the nonce the record is Failed and the nonce released.
    async fn resolve_missing(
        &self,
        user: &UserId,
        record: &TransactionRecord,
        hash: TxHash,
    ) -> WalletResult<Option<RecordUpdate>> {
        let Some(nonce) = record.nonce else {
            return Ok(None);
        };
        let chain_nonce = retry_transient(&self.retry, "get_nonce", || {
            self.chain.get_nonce(record.from)
        })
        .await?;

        if chain_nonce <= nonce {
            let Some(raw) = record.raw.clone() else {
                return Ok(None);
            };
            let signed = SignedTransaction {
                hash,
                from: record.from,
                nonce,
                raw,
            };
            match submit_signed(self.chain.as_ref(), &signed, &self.retry).await? {
                SubmitOutcome::Accepted(_) => {
                    tracing::info!(
                        user_id = %user,
                        request_id = %record.request_id,
                        tx_hash = %hash,
                        nonce,
                        "Rebroadcast transaction the node had lost"
                    );
                    return Ok(None);
                }
                SubmitOutcome::Unknown(_) => return Ok(None),
                SubmitOutcome::Rejected(e) if e.reject_reason() != Some(RejectReason::NonceTooLow) => {
                    return Ok(Some(RecordUpdate::Failed {
                        block_number: None,
                        error: WalletError::from_chain(&e).info(),
                    }));
                }
                SubmitOutcome::Rejected(_) => {}
            }
        }

        // The nonce is spent; make sure it was not spent by this transaction.
        let observation =
            observe(self.chain.as_ref(), hash, self.config.confirmation.confirmation_blocks)
                .await?;
        Ok(match observation {
            Observation::Missing => {
                tracing::warn!(
                    user_id = %user,
                    request_id = %record.request_id,
                    tx_hash = %hash,
                    nonce,
                    chain_nonce,
                    "Transaction dropped; nonce used by another transaction"
                );
                Some(RecordUpdate::Failed {
                    block_number: None,
                    error: ErrorInfo::new(
                        ErrorKind::ChainRejected,
                        format!("transaction dropped or replaced: nonce {nonce} already used"),
                    ),
                })
            }
            other => other.to_update(),
        })
    }

    async fn reconcile_quietly(&self, user: &UserId) {
        if let Err(e) = self.reconcile_pending(user).await {
            tracing::warn!(user_id = %user, error = %e, "Reconciliation skipped");
        }
    }

    /// Run one planned call through nonce selection, estimation, signing,
    /// submission and confirmation. The caller holds the user's write lock.
    ///
    /// Returns a record for every outcome the chain decided (Failed when it
    /// refused, Pending when the outcome is still open). Returns `Err` when
    /// nothing was decided, e.g. the RPC stayed unreachable.
    async fn execute(
        &self,
        user: &UserId,
        wallet: &Wallet,
        call: PlannedCall,
    ) -> WalletResult<TransactionRecord> {
        let mut retry_of: Option<Uuid> = None;

        loop {
            let request = match self.prepare(user, wallet, &call, retry_of).await? {
                Ok(request) => request,
                Err(failed) => return Ok(failed),
            };

            let signed = self
                .vault
                .sign(user, &request.to_unsigned(self.chain.chain_id()))
                .await?;

            tracing::info!(
                user_id = %user,
                request_id = %request.request_id,
                operation = %request.kind,
                nonce = request.nonce,
                tx_hash = %signed.hash,
                "Submitting transaction"
            );

            match submit_signed(self.chain.as_ref(), &signed, &self.retry).await? {
                SubmitOutcome::Accepted(hash) => {
                    metrics::record_submitted(request.kind.as_str());
                    self.ledger
                        .append_record(user, request.pending_record(&signed))
                        .await?;
                    return self.follow(user, &request, hash).await;
                }
                SubmitOutcome::Unknown(e) => {
                    // The node may have it; keep the nonce reserved and let
                    // reconciliation settle it.
                    tracing::warn!(
                        user_id = %user,
                        tx_hash = %signed.hash,
                        error = %e,
                        "Submission outcome unknown, recording as pending"
                    );
                    let record = request.pending_record(&signed);
                    self.ledger.append_record(user, record.clone()).await?;
                    return Ok(record);
                }
                SubmitOutcome::Rejected(e) => {
                    let failed = request.failed_record(WalletError::from_chain(&e).info());
                    self.ledger.append_record(user, failed.clone()).await?;

                    if e.reject_reason() == Some(RejectReason::NonceTooLow) && retry_of.is_none() {
                        tracing::warn!(
                            user_id = %user,
                            nonce = request.nonce,
                            "Nonce already used, rebuilding with a fresh nonce"
                        );
                        retry_of = Some(request.request_id);
                        continue;
                    }

                    metrics::record_outcome(failed.kind.as_str(), failed.status.as_str());
                    tracing::warn!(
                        user_id = %user,
                        request_id = %failed.request_id,
                        error = %e,
                        "Transaction rejected"
                    );
                    return Ok(failed);
                }
            }
        }
    }

    /// Pick nonce and gas. A chain refusal at this stage yields a Failed
    /// record (appended) and nothing is signed.
    async fn prepare(
        &self,
        user: &UserId,
        wallet: &Wallet,
        call: &PlannedCall,
        retry_of: Option<Uuid>,
    ) -> WalletResult<Result<TransactionRequest, TransactionRecord>> {
        let chain_nonce = retry_transient(&self.retry, "get_nonce", || {
            self.chain.get_nonce(wallet.address)
        })
        .await?;
        let nonce = reconcile_nonce(self.ledger.last_nonce(user).await?, chain_nonce);

        let mut request = TransactionRequest {
            request_id: Uuid::new_v4(),
            kind: call.kind,
            from: wallet.address,
            target: call.target,
            amount: call.amount,
            data: call.data.clone(),
            nonce,
            gas: GasParams {
                gas_price: 0,
                gas_limit: 0,
            },
            retry_of,
        };

        let estimate_call = CallRequest::new(wallet.address, call.target, call.data.clone());
        let priced = async {
            let estimate = retry_transient(&self.retry, "estimate_gas", || {
                self.chain.estimate_gas(&estimate_call)
            })
            .await?;
            let base_price =
                retry_transient(&self.retry, "gas_price", || self.chain.gas_price()).await?;
            let gas_price = buffered_gas_price(base_price, &self.config.chain)?;
            Ok::<_, ChainError>(GasParams {
                gas_price,
                gas_limit: buffered_gas_limit(estimate, &self.config.chain),
            })
        }
        .await;

        match priced {
            Ok(gas) => {
                request.gas = gas;
                Ok(Ok(request))
            }
            Err(e @ ChainError::Rejected { .. }) => {
                tracing::warn!(
                    user_id = %user,
                    operation = %call.kind,
                    error = %e,
                    "Refused before submission"
                );
                let failed = TransactionRecord::failed(
                    request.request_id,
                    request.kind,
                    request.from,
                    request.target,
                    request.amount,
                    None,
                    WalletError::from_chain(&e).info(),
                )
                .with_retry_of(retry_of);
                self.ledger.append_record(user, failed.clone()).await?;
                metrics::record_outcome(failed.kind.as_str(), failed.status.as_str());
                Ok(Err(failed))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Wait for confirmation of an accepted transaction and record it.
    async fn follow(
        &self,
        user: &UserId,
        request: &TransactionRequest,
        hash: TxHash,
    ) -> WalletResult<TransactionRecord> {
        let observation =
            await_confirmation(self.chain.as_ref(), hash, &self.config.confirmation).await;

        if let Some(update) = observation.to_update() {
            if let Some(updated) = self.apply_update(user, request.request_id, update).await? {
                if updated.status.is_terminal() {
                    metrics::record_outcome(updated.kind.as_str(), updated.status.as_str());
                    tracing::info!(
                        user_id = %user,
                        request_id = %updated.request_id,
                        tx_hash = %hash,
                        status = %updated.status,
                        "Transaction settled"
                    );
                }
            }
        }

        self.ledger
            .record(user, request.request_id)
            .await?
            .ok_or_else(|| {
                WalletError::StorageUnavailable(format!(
                    "record {} missing after append",
                    request.request_id
                ))
            })
    }

    /// Apply an update, tolerating a record that another task already
    /// settled.
    async fn apply_update(
        &self,
        user: &UserId,
        request_id: Uuid,
        update: RecordUpdate,
    ) -> WalletResult<Option<TransactionRecord>> {
        match self.ledger.update_record(user, request_id, update).await {
            Ok(record) => Ok(Some(record)),
            Err(LedgerError::IllegalTransition { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn check_claim_interval(&self, user: &UserId) -> WalletResult<()> {
        let interval = self.config.rewards.min_claim_interval_secs;
        if interval == 0 {
            return Ok(());
        }

        let last_claim = self
            .ledger
            .history(user)
            .await?
            .into_iter()
            .rev()
            .find(|r| r.kind == OperationKind::ClaimReward && r.status != TxStatus::Failed);

        if let Some(last) = last_claim {
            let next_allowed = last.created_at.saturating_add(interval);
            let now = now_secs();
            if now < next_allowed {
                return Err(WalletError::RateLimited(next_allowed - now));
            }
        }
        Ok(())
    }

    async fn refresh_balance(&self, user: &UserId, address: Address) {
        let token = self.config.contracts.token;
        match self.chain.get_balance(address, token).await {
            Ok(balance) => {
                if let Err(e) = self.ledger.cache_balance(user, token, balance).await {
                    tracing::warn!(user_id = %user, error = %e, "Failed to cache balance");
                }
            }
            Err(e) => tracing::debug!(user_id = %user, error = %e, "Balance refresh skipped"),
        }
    }
}
