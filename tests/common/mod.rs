//! Shared utilities for integration tests.

#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use wallet_orchestrator::chain::contracts::{encode_uint, IERC20, IRewardPool};
use wallet_orchestrator::chain::{
    CallRequest, ChainClient, ChainError, ChainResult, Receipt, ReceiptLookup, SignedTransaction,
};
use wallet_orchestrator::config::AppConfig;
use wallet_orchestrator::identity::UserId;
use wallet_orchestrator::ledger::UserLedger;
use wallet_orchestrator::orchestrator::Orchestrator;
use wallet_orchestrator::vault::KeyVault;
use wallet_orchestrator::WalletService;

pub const CHAIN_ID: u64 = 11155111;
pub const HEAD_BLOCK: u64 = 100;
pub const TOKEN: Address = Address::repeat_byte(0x70);
pub const VAULT: Address = Address::repeat_byte(0x71);
pub const REWARD_POOL: Address = Address::repeat_byte(0x72);

/// What the next `submit` call does.
#[derive(Debug)]
pub enum SubmitScript {
    Accept,
    /// Fail without the node keeping the transaction.
    Fail(ChainError),
    /// Take the transaction, then drop the connection before answering.
    LoseResponse,
}

#[derive(Default)]
struct MockState {
    nonces: HashMap<Address, u64>,
    token_balances: HashMap<Address, U256>,
    native_balances: HashMap<Address, U256>,
    allowance: Option<U256>,
    reward: U256,
    submit_script: VecDeque<SubmitScript>,
    estimate_rejection: Option<String>,
    receipt_failures: usize,
    auto_mine: bool,
    revert_next: bool,
    offline: bool,
    submitted: Vec<SignedTransaction>,
    pool: HashSet<TxHash>,
    receipts: HashMap<TxHash, Receipt>,
}

/// In-memory chain with scriptable failures and call counters.
pub struct MockChain {
    state: Mutex<MockState>,
    submit_delay: Mutex<Duration>,
    pub submit_calls: AtomicUsize,
    pub estimate_calls: AtomicUsize,
    pub receipt_calls: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                auto_mine: true,
                ..Default::default()
            }),
            submit_delay: Mutex::new(Duration::ZERO),
            submit_calls: AtomicUsize::new(0),
            estimate_calls: AtomicUsize::new(0),
            receipt_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().unwrap().nonces.insert(address, nonce);
    }

    pub fn set_token_balance(&self, address: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .token_balances
            .insert(address, amount);
    }

    pub fn set_allowance(&self, amount: U256) {
        self.state.lock().unwrap().allowance = Some(amount);
    }

    pub fn set_reward(&self, amount: U256) {
        self.state.lock().unwrap().reward = amount;
    }

    pub fn script_submit(&self, script: SubmitScript) {
        self.state.lock().unwrap().submit_script.push_back(script);
    }

    pub fn reject_estimates(&self, message: &str) {
        self.state.lock().unwrap().estimate_rejection = Some(message.to_string());
    }

    /// The next `count` receipt lookups fail with a network error.
    pub fn fail_receipts(&self, count: usize) {
        self.state.lock().unwrap().receipt_failures = count;
    }

    /// When off, accepted transactions stay in the pool until `mine`.
    pub fn set_auto_mine(&self, enabled: bool) {
        self.state.lock().unwrap().auto_mine = enabled;
    }

    pub fn revert_next(&self) {
        self.state.lock().unwrap().revert_next = true;
    }

    /// While offline, head-block queries fail.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = delay;
    }

    /// Include a transaction deep enough to be confirmed.
    pub fn mine(&self, hash: TxHash) {
        let mut state = self.state.lock().unwrap();
        state.pool.remove(&hash);
        state.receipts.insert(
            hash,
            Receipt {
                tx_hash: hash,
                block_number: HEAD_BLOCK - 5,
                success: true,
                gas_used: 50_000,
            },
        );
    }

    /// Every transaction the node accepted, in order.
    pub fn submitted(&self) -> Vec<SignedTransaction> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn submitted_nonces(&self, from: Address) -> Vec<u64> {
        self.submitted()
            .into_iter()
            .filter(|tx| tx.from == from)
            .map(|tx| tx.nonce)
            .collect()
    }

    pub fn submit_count(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        CHAIN_ID
    }

    async fn get_native_balance(&self, holder: Address) -> ChainResult<U256> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .native_balances
            .get(&holder)
            .copied()
            .unwrap_or(U256::from(10u64).pow(U256::from(17))))
    }

    async fn get_nonce(&self, address: Address) -> ChainResult<u64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .nonces
            .get(&address)
            .copied()
            .unwrap_or(0))
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        Ok(2_000_000_000)
    }

    async fn estimate_gas(&self, _call: &CallRequest) -> ChainResult<u64> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        match &self.state.lock().unwrap().estimate_rejection {
            Some(message) => Err(ChainError::rejected(message.clone())),
            None => Ok(60_000),
        }
    }

    async fn call(&self, call: &CallRequest) -> ChainResult<Bytes> {
        let state = self.state.lock().unwrap();
        let selector: [u8; 4] = call
            .data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ChainError::rejected("execution reverted: empty calldata"))?;

        let value = if selector == IERC20::balanceOfCall::SELECTOR {
            state
                .token_balances
                .get(&call.from)
                .copied()
                .unwrap_or(U256::ZERO)
        } else if selector == IERC20::allowanceCall::SELECTOR {
            state.allowance.unwrap_or(U256::MAX)
        } else if selector == IRewardPool::calculateRewardCall::SELECTOR {
            state.reward
        } else {
            return Err(ChainError::rejected("execution reverted: unknown selector"));
        };
        Ok(encode_uint(value))
    }

    async fn submit(&self, tx: &SignedTransaction) -> ChainResult<TxHash> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.submit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        let lose_response = match state.submit_script.pop_front() {
            Some(SubmitScript::Fail(err)) => return Err(err),
            Some(SubmitScript::LoseResponse) => true,
            Some(SubmitScript::Accept) | None => false,
        };

        // Like geth, only the pool answers "already known"; a mined
        // duplicate fails the nonce check instead.
        if state.pool.contains(&tx.hash) {
            return Err(ChainError::rejected("already known"));
        }
        let expected = state.nonces.get(&tx.from).copied().unwrap_or(0);
        if tx.nonce < expected {
            return Err(ChainError::rejected("nonce too low"));
        }

        state.nonces.insert(tx.from, tx.nonce + 1);
        state.submitted.push(tx.clone());
        if state.auto_mine {
            let success = !std::mem::take(&mut state.revert_next);
            state.receipts.insert(
                tx.hash,
                Receipt {
                    tx_hash: tx.hash,
                    block_number: HEAD_BLOCK - 5,
                    success,
                    gas_used: 50_000,
                },
            );
        } else {
            state.pool.insert(tx.hash);
        }
        if lose_response {
            return Err(ChainError::Network("connection reset".to_string()));
        }
        Ok(tx.hash)
    }

    async fn get_receipt(&self, hash: TxHash) -> ChainResult<ReceiptLookup> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.receipt_failures > 0 {
            state.receipt_failures -= 1;
            return Err(ChainError::Network("connection reset".to_string()));
        }
        if let Some(receipt) = state.receipts.get(&hash) {
            return Ok(ReceiptLookup::Mined(receipt.clone()));
        }
        if state.pool.contains(&hash) {
            return Ok(ReceiptLookup::Pending);
        }
        Ok(ReceiptLookup::NotFound)
    }

    async fn block_number(&self) -> ChainResult<u64> {
        if self.state.lock().unwrap().offline {
            return Err(ChainError::Network("connection refused".to_string()));
        }
        Ok(HEAD_BLOCK)
    }
}

/// Removes the data directory when the last harness using it drops.
pub struct TempDir(pub PathBuf);

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Fast settings over a unique data directory.
pub fn test_config(dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.data_dir = dir.to_path_buf();
    config.contracts.token = TOKEN;
    config.contracts.vault = VAULT;
    config.contracts.reward_pool = REWARD_POOL;
    config.retries.max_retries = 3;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 4;
    config.confirmation.confirmation_blocks = 2;
    config.confirmation.poll_interval_ms = 5;
    config.confirmation.timeout_secs = 1;
    config.vault.kdf_memory_kib = 64;
    config.vault.kdf_iterations = 1;
    config.vault.kdf_parallelism = 1;
    config
}

/// A wallet core wired to a [`MockChain`].
pub struct Harness {
    pub chain: Arc<MockChain>,
    pub service: WalletService,
    pub orchestrator: Arc<Orchestrator>,
    pub ledger: UserLedger,
    pub config: AppConfig,
    dir: Arc<TempDir>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = std::env::temp_dir().join(format!("wallet-orchestrator-test-{}", Uuid::new_v4()));
        let mut config = test_config(&dir);
        adjust(&mut config);
        Self::build(Arc::new(MockChain::new()), config, Arc::new(TempDir(dir)))
    }

    /// Simulate a process restart: fresh vault, ledger and orchestrator over
    /// the same data directory and chain.
    pub fn restart(&self) -> Self {
        Self::build(self.chain.clone(), self.config.clone(), self.dir.clone())
    }

    fn build(chain: Arc<MockChain>, config: AppConfig, dir: Arc<TempDir>) -> Self {
        let ledger = UserLedger::open(&config.storage.data_dir).unwrap();
        let vault = KeyVault::open(
            &config.vault,
            &config.storage.data_dir,
            "integration-test-passphrase",
            ledger.clone(),
        )
        .unwrap();
        let chain_client: Arc<dyn ChainClient> = chain.clone();
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(vault),
            chain_client,
            ledger.clone(),
            Arc::new(config.clone()),
        ));
        let service = WalletService::with_device_identity(orchestrator.clone());
        Self {
            chain,
            service,
            orchestrator,
            ledger,
            config,
            dir,
        }
    }

    /// Address of `user`'s wallet, creating it if needed.
    pub async fn address_of(&self, user: &UserId) -> Address {
        self.service.wallet(user).await.unwrap().address
    }
}

pub fn user(name: &str) -> UserId {
    UserId::new(name).unwrap()
}
