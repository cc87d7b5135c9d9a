//! Metrics collection and exposition.
//!
//! # Metrics
//! - `wallet_created_total` (counter): wallets generated
//! - `wallet_tx_submitted_total` (counter): accepted broadcasts by operation
//! - `wallet_tx_outcome_total` (counter): records by operation and status
//! - `wallet_submit_retries_total` (counter): transient retries by operation
//! - `wallet_rpc_errors_total` (counter): RPC failures by method and class
//! - `wallet_confirmation_seconds` (histogram): submit → confirmed latency
//! - `wallet_chain_health` (gauge): 1=reachable, 0=unreachable

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_wallet_created() {
    counter!("wallet_created_total").increment(1);
}

pub fn record_submitted(operation: &'static str) {
    counter!("wallet_tx_submitted_total", "operation" => operation).increment(1);
}

pub fn record_outcome(operation: &'static str, status: &'static str) {
    counter!("wallet_tx_outcome_total", "operation" => operation, "status" => status).increment(1);
}

pub fn record_retry(operation: &'static str) {
    counter!("wallet_submit_retries_total", "operation" => operation).increment(1);
}

pub fn record_rpc_error(method: &'static str, class: &'static str) {
    counter!("wallet_rpc_errors_total", "method" => method, "class" => class).increment(1);
}

pub fn record_confirmation_latency(elapsed: Duration) {
    histogram!("wallet_confirmation_seconds").record(elapsed.as_secs_f64());
}

pub fn record_chain_health(healthy: bool) {
    gauge!("wallet_chain_health").set(if healthy { 1.0 } else { 0.0 });
}
