//! Failure injection: rejections, timeouts and flaky RPC.

use alloy::primitives::U256;
use std::sync::atomic::Ordering;
use std::time::Duration;

use wallet_orchestrator::chain::ChainError;
use wallet_orchestrator::ledger::{OperationKind, TxStatus};
use wallet_orchestrator::orchestrator::Reconciler;
use wallet_orchestrator::ErrorKind;

mod common;
use common::{user, Harness, SubmitScript};

#[tokio::test]
async fn test_rejected_estimate_never_submits() {
    let h = Harness::new();
    let alice = user("alice");
    h.chain
        .reject_estimates("execution reverted: epoch already claimed");

    let record = h.service.claim_reward(&alice).await.unwrap();

    assert_eq!(record.status, TxStatus::Failed);
    assert!(record.hash.is_none());
    let error = record.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ChainRejected);
    assert!(error.cause.contains("epoch already claimed"));
    assert_eq!(h.chain.submit_count(), 0);
    assert_eq!(h.ledger.last_nonce(&alice).await.unwrap(), None);
}

#[tokio::test]
async fn test_submit_timeout_stays_pending_then_confirms() {
    let h = Harness::new();
    let alice = user("alice");
    h.chain.script_submit(SubmitScript::Fail(ChainError::Timeout(10)));

    let record = h.service.deposit(&alice, U256::from(50)).await.unwrap();
    assert_eq!(record.status, TxStatus::Pending);
    assert!(record.error.is_none());
    let hash = record.hash.unwrap();

    h.chain.mine(hash);
    let history = h.service.history(&alice).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].request_id, record.request_id);
    assert_eq!(history[0].status, TxStatus::Confirmed);
}

#[tokio::test]
async fn test_network_errors_retry_same_payload() {
    let h = Harness::new();
    let alice = user("alice");
    h.chain
        .script_submit(SubmitScript::Fail(ChainError::Network("reset".into())));
    h.chain
        .script_submit(SubmitScript::Fail(ChainError::Network("reset".into())));

    let record = h.service.deposit(&alice, U256::from(50)).await.unwrap();

    assert_eq!(record.status, TxStatus::Confirmed);
    assert_eq!(h.chain.submit_count(), 3);
    assert_eq!(h.chain.submitted().len(), 1);
    assert_eq!(record.hash, Some(h.chain.submitted()[0].hash));
    assert_eq!(h.service.history(&alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_network_exhaustion_surfaces_error() {
    let h = Harness::new();
    let alice = user("alice");
    for _ in 0..4 {
        h.chain
            .script_submit(SubmitScript::Fail(ChainError::Network("down".into())));
    }

    let err = h.service.deposit(&alice, U256::from(50)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkError);
    assert_eq!(h.chain.submit_count(), 4);
    assert!(h.service.history(&alice).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_lost_response_then_nonce_too_low_is_not_resent() {
    let h = Harness::new();
    let alice = user("alice");
    let address = h.address_of(&alice).await;
    h.chain.script_submit(SubmitScript::LoseResponse);

    let record = h.service.deposit(&alice, U256::from(50)).await.unwrap();

    assert_eq!(record.status, TxStatus::Confirmed);
    assert_eq!(record.nonce, Some(0));
    assert_eq!(h.chain.submit_count(), 2);
    assert_eq!(h.chain.submitted().len(), 1);
    assert_eq!(record.hash, Some(h.chain.submitted()[0].hash));
    assert_eq!(h.service.history(&alice).await.unwrap().len(), 1);

    let next = h.service.deposit(&alice, U256::from(5)).await.unwrap();
    assert_eq!(next.nonce, Some(1));
    assert_eq!(h.chain.submitted_nonces(address), vec![0, 1]);
}

#[tokio::test]
async fn test_timed_out_submit_the_node_never_saw_is_rebroadcast() {
    let h = Harness::new();
    let alice = user("alice");
    let address = h.address_of(&alice).await;
    h.chain.script_submit(SubmitScript::Fail(ChainError::Timeout(10)));

    let record = h.service.deposit(&alice, U256::from(50)).await.unwrap();
    assert_eq!(record.status, TxStatus::Pending);
    assert_eq!(record.nonce, Some(0));
    assert!(h.chain.submitted().is_empty());

    // First pass sends the stored bytes again, the second sees them mined.
    assert_eq!(h.service.reconcile(&alice).await.unwrap(), 0);
    assert_eq!(h.chain.submitted().len(), 1);
    assert_eq!(record.hash, Some(h.chain.submitted()[0].hash));
    assert_eq!(h.service.reconcile(&alice).await.unwrap(), 1);

    let settled = h.ledger.record(&alice, record.request_id).await.unwrap().unwrap();
    assert_eq!(settled.status, TxStatus::Confirmed);
    assert!(settled.raw.is_none());

    let next = h.service.deposit(&alice, U256::from(5)).await.unwrap();
    assert_eq!(next.status, TxStatus::Confirmed);
    assert_eq!(next.nonce, Some(1));
    assert_eq!(h.chain.submitted_nonces(address), vec![0, 1]);
}

#[tokio::test]
async fn test_dropped_transaction_fails_and_frees_its_nonce() {
    let h = Harness::new();
    let alice = user("alice");
    let address = h.address_of(&alice).await;
    h.chain.script_submit(SubmitScript::Fail(ChainError::Timeout(10)));

    let record = h.service.deposit(&alice, U256::from(50)).await.unwrap();
    assert_eq!(record.status, TxStatus::Pending);
    assert_eq!(h.ledger.last_nonce(&alice).await.unwrap(), Some(0));

    // Another transaction from the same account took nonce 0.
    h.chain.set_nonce(address, 1);
    assert_eq!(h.service.reconcile(&alice).await.unwrap(), 1);

    let dropped = h.ledger.record(&alice, record.request_id).await.unwrap().unwrap();
    assert_eq!(dropped.status, TxStatus::Failed);
    assert!(dropped.block_number.is_none());
    let error = dropped.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ChainRejected);
    assert!(error.cause.contains("dropped"));
    assert_eq!(h.ledger.last_nonce(&alice).await.unwrap(), None);
    assert!(h.chain.submitted().is_empty());

    let next = h.service.deposit(&alice, U256::from(5)).await.unwrap();
    assert_eq!(next.status, TxStatus::Confirmed);
    assert_eq!(h.chain.submitted_nonces(address), vec![1]);
}

#[tokio::test]
async fn test_reconciler_waits_for_reachable_chain() {
    let h = Harness::new();
    let alice = user("alice");
    h.chain.set_auto_mine(false);

    let record = h.service.claim_reward(&alice).await.unwrap();
    assert_eq!(record.status, TxStatus::Pending);
    h.chain.mine(record.hash.unwrap());

    let reconciler = Reconciler::new(h.orchestrator.clone(), Duration::from_millis(10));
    h.chain.set_offline(true);
    assert_eq!(reconciler.run_once().await, 0);
    let current = h.ledger.record(&alice, record.request_id).await.unwrap().unwrap();
    assert_eq!(current.status, TxStatus::Pending);

    h.chain.set_offline(false);
    assert_eq!(reconciler.run_once().await, 1);
}

#[tokio::test]
async fn test_nonce_conflict_rebuilds_once() {
    let h = Harness::new();
    let alice = user("alice");
    h.chain
        .script_submit(SubmitScript::Fail(ChainError::rejected("nonce too low")));

    let record = h.service.claim_reward(&alice).await.unwrap();
    assert_eq!(record.status, TxStatus::Confirmed);

    let history = h.service.history(&alice).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, TxStatus::Failed);
    assert!(history[0].retry_of.is_none());
    assert_eq!(history[1].retry_of, Some(history[0].request_id));
    assert_eq!(history[1].request_id, record.request_id);
    assert_eq!(h.chain.submit_count(), 2);
}

#[tokio::test]
async fn test_repeated_nonce_conflict_fails() {
    let h = Harness::new();
    let alice = user("alice");
    for _ in 0..2 {
        h.chain
            .script_submit(SubmitScript::Fail(ChainError::rejected("nonce too low")));
    }

    let record = h.service.claim_reward(&alice).await.unwrap();

    assert_eq!(record.status, TxStatus::Failed);
    assert_eq!(record.error.unwrap().kind, ErrorKind::ChainRejected);
    assert_eq!(h.chain.submit_count(), 2);
    assert_eq!(h.service.history(&alice).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_insufficient_funds_classified() {
    let h = Harness::new();
    let alice = user("alice");
    h.chain.script_submit(SubmitScript::Fail(ChainError::rejected(
        "insufficient funds for gas * price + value",
    )));

    let record = h.service.deposit(&alice, U256::from(50)).await.unwrap();

    assert_eq!(record.status, TxStatus::Failed);
    assert_eq!(record.error.unwrap().kind, ErrorKind::InsufficientFunds);
    assert_eq!(h.chain.submit_count(), 1);
}

#[tokio::test]
async fn test_reverted_receipt_fails_record() {
    let h = Harness::new();
    let alice = user("alice");
    h.chain.revert_next();

    let record = h.service.claim_reward(&alice).await.unwrap();

    assert_eq!(record.status, TxStatus::Failed);
    assert!(record.hash.is_some());
    assert!(record.block_number.is_some());
    assert_eq!(record.error.unwrap().kind, ErrorKind::ChainRejected);
    // The nonce was consumed on chain.
    assert_eq!(h.ledger.last_nonce(&alice).await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_lost_connection_while_polling_is_not_failure() {
    let h = Harness::new();
    let alice = user("alice");
    h.chain.fail_receipts(3);

    let record = h.service.deposit(&alice, U256::from(50)).await.unwrap();

    assert_eq!(record.status, TxStatus::Confirmed);
    assert!(h.chain.receipt_calls.load(Ordering::SeqCst) >= 4);
}

#[tokio::test]
async fn test_confirmation_timeout_leaves_pending() {
    let h = Harness::new();
    let alice = user("alice");
    h.chain.set_auto_mine(false);

    let record = h.service.claim_reward(&alice).await.unwrap();
    assert_eq!(record.status, TxStatus::Pending);

    h.chain.mine(record.hash.unwrap());
    h.service.get_balance(&alice).await.unwrap();
    let settled = h.ledger.record(&alice, record.request_id).await.unwrap().unwrap();
    assert_eq!(settled.status, TxStatus::Confirmed);
    assert_eq!(h.ledger.history(&alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_gas_price_ceiling_refuses_before_signing() {
    let h = Harness::with_config(|c| c.chain.max_gas_price_gwei = 1);
    let alice = user("alice");

    let record = h.service.deposit(&alice, U256::from(50)).await.unwrap();

    assert_eq!(record.status, TxStatus::Failed);
    assert_eq!(record.kind, OperationKind::Deposit);
    assert!(record.error.unwrap().cause.contains("gas price"));
    assert_eq!(h.chain.submit_count(), 0);
}

#[tokio::test]
async fn test_unconfirmed_approval_stops_deposit() {
    let h = Harness::new();
    let alice = user("alice");
    h.chain.set_allowance(U256::ZERO);
    h.chain.revert_next();

    let record = h.service.deposit(&alice, U256::from(50)).await.unwrap();

    assert_eq!(record.kind, OperationKind::Approve);
    assert_eq!(record.status, TxStatus::Failed);
    assert_eq!(h.chain.submit_count(), 1);
}
