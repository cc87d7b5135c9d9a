//! Startup orchestration.
//!
//! Subsystems initialize in dependency order; any failure before the
//! orchestrator exists is fatal.

use std::sync::Arc;

use crate::chain::{ChainClient, RpcChainClient};
use crate::config::AppConfig;
use crate::error::WalletResult;
use crate::ledger::UserLedger;
use crate::observability::{init_logging, init_metrics};
use crate::orchestrator::Orchestrator;
use crate::service::WalletService;
use crate::vault::KeyVault;

/// Bring up logging, metrics, storage, vault and the RPC client.
pub async fn start(config: AppConfig) -> WalletResult<WalletService> {
    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wallet-orchestrator starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let chain = RpcChainClient::new(config.chain.clone()).await?;
    if !chain.is_healthy().await {
        tracing::warn!(rpc_url = %config.chain.rpc_url, "Chain unreachable at startup");
    }
    start_with(config, Arc::new(chain))
}

/// Build the service over an existing chain client.
pub fn start_with(config: AppConfig, chain: Arc<dyn ChainClient>) -> WalletResult<WalletService> {
    let data_dir = config.storage.data_dir.clone();
    let ledger = UserLedger::open(&data_dir)?;
    let vault = KeyVault::open_from_env(&config.vault, &data_dir, ledger.clone())?;

    tracing::info!(
        data_dir = %data_dir.display(),
        chain_id = config.chain.chain_id,
        confirmation_blocks = config.confirmation.confirmation_blocks,
        max_retries = config.retries.max_retries,
        "Wallet core ready"
    );

    let orchestrator = Orchestrator::new(Arc::new(vault), chain, ledger, Arc::new(config));
    Ok(WalletService::with_device_identity(Arc::new(orchestrator)))
}
