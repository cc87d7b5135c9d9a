//! Background reconciliation of Pending records.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::engine::Orchestrator;
use crate::lifecycle::Shutdown;

/// Periodically settles Pending records for every known user.
pub struct Reconciler {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// One pass over all users. Returns the number of records settled.
    ///
    /// The pass is skipped while the chain is unreachable.
    pub async fn run_once(&self) -> usize {
        if !self.orchestrator.chain().is_healthy().await {
            tracing::warn!("Chain unreachable, reconciliation pass skipped");
            return 0;
        }

        let users = match self.orchestrator.ledger().known_users() {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot list users for reconciliation");
                return 0;
            }
        };

        let mut settled = 0;
        for user in users {
            match self.orchestrator.reconcile_pending(&user).await {
                Ok(n) => settled += n,
                Err(e) => tracing::warn!(user_id = %user, error = %e, "Reconciliation failed"),
            }
        }
        settled
    }

    /// Run passes until `shutdown` fires.
    pub fn spawn(self, shutdown: &Shutdown) -> JoinHandle<()> {
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            tracing::info!(interval_ms = self.interval.as_millis() as u64, "Reconciler started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    _ = ticker.tick() => {
                        let settled = self.run_once().await;
                        if settled > 0 {
                            tracing::info!(settled, "Reconciliation pass complete");
                        }
                    }
                }
            }
            tracing::info!("Reconciler stopped");
        })
    }
}
