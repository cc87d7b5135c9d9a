//! Nonce selection.

/// Next nonce to use given the ledger's last used nonce and the chain's
/// pending transaction count.
///
/// Takes the larger of the two so that neither a lagging node nor a stale
/// local cache can cause a nonce to be reused.
pub fn reconcile_nonce(last_used: Option<u64>, chain_nonce: u64) -> u64 {
    match last_used {
        Some(last) => chain_nonce.max(last.saturating_add(1)),
        None => chain_nonce,
    }
}
