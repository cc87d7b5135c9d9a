//! Chain RPC client with timeout, failover, and error classification.
//!
//! # Responsibilities
//! - Connect to one primary and any number of failover JSON-RPC endpoints
//! - Query chain state (nonce, balances, receipts, gas)
//! - Broadcast raw signed transactions
//! - Classify failures as transient (network), ambiguous (timeout), or
//!   semantic (node rejection)

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportResult;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::chain::contracts;
use crate::chain::types::{
    CallRequest, ChainConfig, ChainError, ChainId, ChainResult, Receipt, ReceiptLookup,
    SignedTransaction,
};
use crate::observability::metrics;

/// The network boundary used by the orchestrator.
///
/// Implementations hold no per-user state; every call is a fresh round-trip.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain id used for EIP-155 signing.
    fn chain_id(&self) -> u64;

    async fn get_native_balance(&self, holder: Address) -> ChainResult<U256>;

    /// Next nonce for `address`, counting pending transactions.
    async fn get_nonce(&self, address: Address) -> ChainResult<u64>;

    async fn gas_price(&self) -> ChainResult<u128>;

    async fn estimate_gas(&self, call: &CallRequest) -> ChainResult<u64>;

    /// Execute a read-only call against the latest state.
    async fn call(&self, call: &CallRequest) -> ChainResult<Bytes>;

    /// Broadcast a signed transaction and return its hash.
    async fn submit(&self, tx: &SignedTransaction) -> ChainResult<TxHash>;

    async fn get_receipt(&self, hash: TxHash) -> ChainResult<ReceiptLookup>;

    async fn block_number(&self) -> ChainResult<u64>;

    /// Check if the RPC is reachable and publish the health gauge.
    async fn is_healthy(&self) -> bool {
        let healthy = self.block_number().await.is_ok();
        metrics::record_chain_health(healthy);
        healthy
    }

    /// ERC-20 balance of `holder` in `token`'s smallest unit.
    async fn get_balance(&self, holder: Address, token: Address) -> ChainResult<U256> {
        let data = self
            .call(&CallRequest::new(holder, token, contracts::encode_balance_of(holder)))
            .await?;
        contracts::decode_uint(&data)
    }

    /// ERC-20 allowance granted by `owner` to `spender`.
    async fn get_allowance(
        &self,
        owner: Address,
        spender: Address,
        token: Address,
    ) -> ChainResult<U256> {
        let data = self
            .call(&CallRequest::new(
                owner,
                token,
                contracts::encode_allowance(owner, spender),
            ))
            .await?;
        contracts::decode_uint(&data)
    }
}

/// How a call's timeouts are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    /// Timeouts are plain transport failures.
    Read,
    /// A timeout leaves the outcome unknown.
    Broadcast,
}

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// JSON-RPC client wrapper with failover support.
#[derive(Clone)]
pub struct RpcChainClient {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    config: ChainConfig,
    timeout_duration: Duration,
}

impl RpcChainClient {
    /// Create a new client and verify the chain id (warning only).
    pub async fn new(config: ChainConfig) -> ChainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            ChainError::Network(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse::<url::Url>() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let client = Self {
            providers,
            config: config.clone(),
            timeout_duration,
        };

        match client.verify_chain_id().await {
            Ok(()) => {
                tracing::info!(
                    rpc_url = %config.rpc_url,
                    chain_id = config.chain_id,
                    failovers = client.providers.len() - 1,
                    "Chain client initialized"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Chain client initialized but chain verification failed"
                );
            }
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> ChainResult<()> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(ChainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    pub async fn get_chain_id(&self) -> ChainResult<ChainId> {
        self.dispatch("get_chain_id", CallKind::Read, |p| async move {
            p.get_chain_id().await
        })
        .await
        .map(ChainId)
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Run `op` against each provider in order until one answers.
    ///
    /// A verdict on the transaction is returned at once. Provider errors,
    /// transport failures and timeouts move on to the next provider.
    async fn dispatch<T, F, Fut>(&self, method: &'static str, kind: CallKind, op: F) -> ChainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let mut saw_timeout = false;
        let mut last_error = None;

        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, op(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    let err = match e.as_error_resp() {
                        Some(payload) => ChainError::from_rpc(payload.code, payload.message.as_ref()),
                        None => ChainError::Network(e.to_string()),
                    };
                    metrics::record_rpc_error(method, err.class());
                    if let ChainError::Rejected { .. } = err {
                        tracing::debug!(provider_idx = i, method, error = %err, "Node rejected request");
                        return Err(err);
                    }
                    tracing::warn!(provider_idx = i, method, error = %err, "RPC error, trying next provider");
                    last_error = Some(err);
                }
                Err(_) => {
                    saw_timeout = true;
                    metrics::record_rpc_error(method, "timeout");
                    tracing::warn!(provider_idx = i, method, "RPC timeout, trying next provider");
                }
            }
        }

        if kind == CallKind::Broadcast && saw_timeout {
            return Err(ChainError::Timeout(self.config.rpc_timeout_secs));
        }
        Err(ChainError::Network(match last_error {
            Some(err) => format!("All RPC providers failed to {method}: {err}"),
            None => format!("All RPC providers failed to {method}"),
        }))
    }
}

fn to_request(call: &CallRequest) -> TransactionRequest {
    TransactionRequest::default()
        .with_from(call.from)
        .with_to(call.to)
        .with_value(call.value)
        .with_input(call.data.clone())
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn get_native_balance(&self, holder: Address) -> ChainResult<U256> {
        self.dispatch("get_balance", CallKind::Read, |p| async move {
            p.get_balance(holder).await
        })
        .await
    }

    async fn get_nonce(&self, address: Address) -> ChainResult<u64> {
        self.dispatch("get_transaction_count", CallKind::Read, |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        self.dispatch("get_gas_price", CallKind::Read, |p| async move {
            p.get_gas_price().await
        })
        .await
    }

    async fn estimate_gas(&self, call: &CallRequest) -> ChainResult<u64> {
        let request = to_request(call);
        self.dispatch("estimate_gas", CallKind::Read, |p| {
            let request = request.clone();
            async move { p.estimate_gas(request).await }
        })
        .await
    }

    async fn call(&self, call: &CallRequest) -> ChainResult<Bytes> {
        let request = to_request(call);
        self.dispatch("call", CallKind::Read, |p| {
            let request = request.clone();
            async move { p.call(request).await }
        })
        .await
    }

    async fn submit(&self, tx: &SignedTransaction) -> ChainResult<TxHash> {
        let raw = tx.raw.clone();
        self.dispatch("send_raw_transaction", CallKind::Broadcast, |p| {
            let raw = raw.clone();
            async move {
                p.send_raw_transaction(&raw)
                    .await
                    .map(|pending| *pending.tx_hash())
            }
        })
        .await
    }

    async fn get_receipt(&self, hash: TxHash) -> ChainResult<ReceiptLookup> {
        let receipt = self
            .dispatch("get_transaction_receipt", CallKind::Read, |p| async move {
                p.get_transaction_receipt(hash).await
            })
            .await?;

        if let Some(receipt) = receipt {
            let block_number = receipt.block_number.ok_or_else(|| {
                ChainError::InvalidResponse(format!("receipt for {} has no block number", hash))
            })?;
            return Ok(ReceiptLookup::Mined(Receipt {
                tx_hash: hash,
                block_number,
                success: receipt.status(),
                gas_used: receipt.gas_used as u64,
            }));
        }

        let known = self
            .dispatch("get_transaction_by_hash", CallKind::Read, |p| async move {
                p.get_transaction_by_hash(hash).await
            })
            .await?;

        Ok(if known.is_some() {
            ReceiptLookup::Pending
        } else {
            ReceiptLookup::NotFound
        })
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self.dispatch("get_block_number", CallKind::Read, |p| async move {
            p.get_block_number().await
        })
        .await
    }
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("providers", &self.providers.len())
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}
