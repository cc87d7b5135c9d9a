//! Receipt polling and confirmation depth.

use alloy::primitives::TxHash;
use std::time::{Duration, Instant};

use crate::chain::{ChainClient, ChainResult, ReceiptLookup};
use crate::config::ConfirmationConfig;
use crate::error::{ErrorInfo, ErrorKind};
use crate::ledger::RecordUpdate;
use crate::observability::metrics;

/// What one receipt lookup said about a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Mined, succeeded, and deep enough.
    Confirmed { block_number: u64, confirmations: u32 },
    /// Mined but below the confirmation threshold.
    Mined { block_number: u64, confirmations: u32 },
    /// Mined and reverted.
    Reverted { block_number: u64 },
    /// In the node's pool, not mined yet.
    Waiting,
    /// Unknown to the node: never received, or dropped from its pool.
    Missing,
}

impl Observation {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Observation::Confirmed { .. } | Observation::Reverted { .. }
        )
    }

    /// Ledger update implied by this observation, if any.
    pub fn to_update(&self) -> Option<RecordUpdate> {
        match *self {
            Observation::Confirmed {
                block_number,
                confirmations,
            } => Some(RecordUpdate::Confirmed {
                block_number,
                confirmations,
            }),
            Observation::Mined {
                block_number,
                confirmations,
            } => Some(RecordUpdate::Mined {
                block_number,
                confirmations,
            }),
            Observation::Reverted { block_number } => Some(RecordUpdate::Failed {
                block_number: Some(block_number),
                error: ErrorInfo::new(ErrorKind::ChainRejected, "execution reverted"),
            }),
            Observation::Waiting | Observation::Missing => None,
        }
    }
}

/// Look up a transaction once.
pub async fn observe(
    chain: &dyn ChainClient,
    hash: TxHash,
    required_confirmations: u32,
) -> ChainResult<Observation> {
    let receipt = match chain.get_receipt(hash).await? {
        ReceiptLookup::Mined(receipt) => receipt,
        ReceiptLookup::Pending => return Ok(Observation::Waiting),
        ReceiptLookup::NotFound => return Ok(Observation::Missing),
    };

    if !receipt.success {
        return Ok(Observation::Reverted {
            block_number: receipt.block_number,
        });
    }

    let head = chain.block_number().await?;
    let depth = head.saturating_sub(receipt.block_number).saturating_add(1);
    let confirmations = u32::try_from(depth).unwrap_or(u32::MAX);

    if confirmations >= required_confirmations {
        Ok(Observation::Confirmed {
            block_number: receipt.block_number,
            confirmations,
        })
    } else {
        Ok(Observation::Mined {
            block_number: receipt.block_number,
            confirmations,
        })
    }
}

/// Poll until the transaction is final or the confirmation timeout passes.
///
/// Lookup failures are logged and polling continues: a lost connection is
/// not evidence that the transaction failed. On timeout the last non-final
/// observation is returned.
pub async fn await_confirmation(
    chain: &dyn ChainClient,
    hash: TxHash,
    config: &ConfirmationConfig,
) -> Observation {
    let started = Instant::now();
    let deadline = started + Duration::from_secs(config.timeout_secs);
    let interval = Duration::from_millis(config.poll_interval_ms);
    let mut last = Observation::Waiting;

    loop {
        match observe(chain, hash, config.confirmation_blocks).await {
            Ok(observation) if observation.is_final() => {
                if matches!(observation, Observation::Confirmed { .. }) {
                    metrics::record_confirmation_latency(started.elapsed());
                }
                return observation;
            }
            Ok(observation) => last = observation,
            Err(e) => {
                tracing::warn!(tx_hash = %hash, error = %e, "Receipt lookup failed, will retry");
            }
        }

        if Instant::now() + interval > deadline {
            tracing::info!(
                tx_hash = %hash,
                waited_secs = started.elapsed().as_secs(),
                "Confirmation wait timed out; transaction stays pending"
            );
            return last;
        }
        tokio::time::sleep(interval).await;
    }
}
