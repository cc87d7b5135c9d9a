//! Presentation-facing facade.
//!
//! Resolves who the caller is, then forwards to the orchestrator. Every
//! method is async and meant to run on the runtime's worker tasks, never on
//! a UI thread; failures carry an [`ErrorKind`](crate::error::ErrorKind)
//! through [`WalletError::info`].

use alloy::primitives::U256;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{WalletError, WalletResult};
use crate::identity::{
    DeviceFingerprintResolver, DeviceSignals, ExplicitLoginResolver, IdentityError,
    IdentityResolver, UserId, UserIdentity,
};
use crate::ledger::TransactionRecord;
use crate::lifecycle::Shutdown;
use crate::orchestrator::{Orchestrator, Reconciler, WalletInfo};
use crate::vault::Wallet;

/// Cheap to clone; all clones share one orchestrator.
#[derive(Clone)]
pub struct WalletService {
    resolver: Arc<dyn IdentityResolver>,
    orchestrator: Arc<Orchestrator>,
}

impl WalletService {
    pub fn new(resolver: Arc<dyn IdentityResolver>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            resolver,
            orchestrator,
        }
    }

    /// A service that identifies callers by device fingerprint.
    pub fn with_device_identity(orchestrator: Arc<Orchestrator>) -> Self {
        Self::new(Arc::new(DeviceFingerprintResolver::new()), orchestrator)
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Resolve the current caller. With `login`, the explicit identifier is
    /// used; otherwise the device fingerprint, failing with
    /// `IdentityUnavailable` when the device offers no stable signal.
    pub fn identify(&self, login: Option<&str>) -> WalletResult<UserIdentity> {
        let signals = DeviceSignals::collect();
        let identity = match login {
            Some(login) => ExplicitLoginResolver::new(login).resolve(&signals),
            None => self.resolver.resolve(&signals),
        };
        identity.map_err(|e| match e {
            IdentityError::Unavailable => WalletError::IdentityUnavailable(
                "no stable device signal; pass an explicit user id".to_string(),
            ),
            other => other.into(),
        })
    }

    /// The caller's wallet, created on first contact.
    pub async fn wallet(&self, user: &UserId) -> WalletResult<Wallet> {
        Ok(self.orchestrator.vault().get_or_create(user).await?)
    }

    pub async fn deposit(&self, user: &UserId, amount: U256) -> WalletResult<TransactionRecord> {
        self.orchestrator.deposit(user, amount).await
    }

    pub async fn claim_reward(&self, user: &UserId) -> WalletResult<TransactionRecord> {
        self.orchestrator.claim_reward(user).await
    }

    pub async fn get_balance(&self, user: &UserId) -> WalletResult<U256> {
        self.orchestrator.get_balance(user).await
    }

    pub async fn history(&self, user: &UserId) -> WalletResult<Vec<TransactionRecord>> {
        self.orchestrator.history(user).await
    }

    pub async fn reward_preview(&self, user: &UserId) -> WalletResult<U256> {
        self.orchestrator.reward_preview(user).await
    }

    pub async fn wallet_info(&self, user: &UserId) -> WalletResult<WalletInfo> {
        self.orchestrator.wallet_info(user).await
    }

    /// Settle Pending records of one user now.
    pub async fn reconcile(&self, user: &UserId) -> WalletResult<usize> {
        self.orchestrator.reconcile_pending(user).await
    }

    /// Start the background reconciler; it stops when `shutdown` fires.
    pub fn spawn_reconciler(&self, shutdown: &Shutdown) -> JoinHandle<()> {
        let interval = Duration::from_millis(
            self.orchestrator
                .config()
                .confirmation
                .poll_interval_ms
                .max(1),
        );
        Reconciler::new(self.orchestrator.clone(), interval).spawn(shutdown)
    }
}
