//! Broadcast of signed transactions.

use alloy::primitives::TxHash;

use crate::chain::{
    ChainClient, ChainError, ChainResult, ReceiptLookup, RejectReason, SignedTransaction,
};
use crate::resilience::{retry_transient, RetryPolicy};

/// How the node answered a broadcast.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The node holds the transaction (including "already known").
    Accepted(TxHash),
    /// The call timed out; the node may or may not have the transaction.
    Unknown(ChainError),
    /// The node refused the transaction.
    Rejected(ChainError),
}

/// Broadcast `signed`, retrying transport failures with the same bytes.
///
/// Returns `Err` only when transient failures outlast the retry bound.
pub async fn submit_signed(
    chain: &dyn ChainClient,
    signed: &SignedTransaction,
    policy: &RetryPolicy,
) -> ChainResult<SubmitOutcome> {
    let result = retry_transient(policy, "submit", || async {
        match chain.submit(signed).await {
            Err(e) if e.reject_reason() == Some(RejectReason::AlreadyKnown) => {
                tracing::debug!(tx_hash = %signed.hash, "Node already has transaction");
                Ok(signed.hash)
            }
            other => other,
        }
    })
    .await;

    match result {
        Ok(hash) => {
            if hash != signed.hash {
                tracing::warn!(
                    expected = %signed.hash,
                    reported = %hash,
                    "Node reported a different transaction hash"
                );
            }
            Ok(SubmitOutcome::Accepted(signed.hash))
        }
        Err(e) if e.reject_reason() == Some(RejectReason::NonceTooLow) => {
            Ok(claim_spent_nonce(chain, signed, e).await)
        }
        Err(e @ ChainError::Timeout(_)) => Ok(SubmitOutcome::Unknown(e)),
        Err(e @ (ChainError::Rejected { .. } | ChainError::ChainMismatch { .. })) => {
            Ok(SubmitOutcome::Rejected(e))
        }
        Err(e) => Err(e),
    }
}

/// "Nonce too low" also answers a resend of our own transaction once an
/// earlier send whose response was lost has been mined. Only a hash the
/// node has never seen is a real conflict.
async fn claim_spent_nonce(
    chain: &dyn ChainClient,
    signed: &SignedTransaction,
    rejection: ChainError,
) -> SubmitOutcome {
    match chain.get_receipt(signed.hash).await {
        Ok(ReceiptLookup::Mined(_) | ReceiptLookup::Pending) => {
            tracing::info!(
                tx_hash = %signed.hash,
                nonce = signed.nonce,
                "Nonce spent by this transaction; an earlier send went through"
            );
            SubmitOutcome::Accepted(signed.hash)
        }
        Ok(ReceiptLookup::NotFound) => SubmitOutcome::Rejected(rejection),
        Err(e) => {
            tracing::warn!(
                tx_hash = %signed.hash,
                error = %e,
                "Cannot tell whether the spent nonce is ours"
            );
            SubmitOutcome::Unknown(rejection)
        }
    }
}
