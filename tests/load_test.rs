//! Concurrency under load: many users, many calls.

use alloy::primitives::U256;
use std::collections::HashSet;
use std::time::Duration;

use wallet_orchestrator::ledger::TxStatus;

mod common;
use common::{user, Harness};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_create_single_wallet() {
    let h = Harness::new();
    let alice = user("alice");

    let mut handles = Vec::new();
    for _ in 0..32 {
        let service = h.service.clone();
        let alice = alice.clone();
        handles.push(tokio::spawn(async move {
            service.wallet(&alice).await.unwrap().address
        }));
    }

    let mut addresses = HashSet::new();
    for handle in handles {
        addresses.insert(handle.await.unwrap());
    }
    assert_eq!(addresses.len(), 1);

    let stored = h.ledger.load(&alice).await.unwrap().unwrap();
    assert!(addresses.contains(&stored.address));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_users_never_share_keys() {
    let h = Harness::new();

    let mut handles = Vec::new();
    for i in 0..100 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service.wallet(&user(&format!("user-{i}"))).await.unwrap().address
        }));
    }

    let mut addresses = HashSet::new();
    for handle in handles {
        assert!(addresses.insert(handle.await.unwrap()));
    }
    assert_eq!(h.ledger.known_users().unwrap().len(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_user_nonces_strictly_increase() {
    let h = Harness::new();
    let alice = user("alice");
    let address = h.address_of(&alice).await;

    let mut handles = Vec::new();
    for i in 0..10u64 {
        let service = h.service.clone();
        let alice = alice.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                service.claim_reward(&alice).await
            } else {
                service.deposit(&alice, U256::from(i)).await
            }
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status, TxStatus::Confirmed);
    }

    let nonces = h.chain.submitted_nonces(address);
    assert_eq!(nonces, (0..10).collect::<Vec<u64>>());

    let mut recorded: Vec<u64> = h
        .ledger
        .history(&alice)
        .await
        .unwrap()
        .iter()
        .filter_map(|r| r.nonce)
        .collect();
    recorded.sort_unstable();
    recorded.dedup();
    assert_eq!(recorded.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_users_in_parallel() {
    let h = Harness::new();

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            let id = user(&format!("user-{i}"));
            let deposit = service.deposit(&id, U256::from(10)).await.unwrap();
            let claim = service.claim_reward(&id).await.unwrap();
            (deposit.nonce, claim.nonce)
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), (Some(0), Some(1)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_balance_does_not_wait_for_pending_write() {
    let h = Harness::new();
    let alice = user("alice");
    let address = h.address_of(&alice).await;
    h.chain.set_token_balance(address, U256::from(9));
    h.chain.set_submit_delay(Duration::from_millis(500));

    let deposit = {
        let service = h.service.clone();
        let alice = alice.clone();
        tokio::spawn(async move { service.deposit(&alice, U256::from(1)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let balance = tokio::time::timeout(Duration::from_millis(300), h.service.get_balance(&alice))
        .await
        .expect("balance query blocked behind a write")
        .unwrap();
    assert_eq!(balance, U256::from(9));

    assert_eq!(deposit.await.unwrap().unwrap().status, TxStatus::Confirmed);
}

#[tokio::test]
async fn test_background_reconciler_settles_pending() {
    let h = Harness::new();
    let alice = user("alice");
    h.chain.set_auto_mine(false);

    let record = h.service.claim_reward(&alice).await.unwrap();
    assert_eq!(record.status, TxStatus::Pending);

    let shutdown = wallet_orchestrator::Shutdown::new();
    let task = h.service.spawn_reconciler(&shutdown);
    h.chain.mine(record.hash.unwrap());

    let mut settled = false;
    for _ in 0..100 {
        let current = h.ledger.record(&alice, record.request_id).await.unwrap().unwrap();
        if current.status == TxStatus::Confirmed {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.trigger();
    task.await.unwrap();
    assert!(settled);
}
