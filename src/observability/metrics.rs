//! Metrics collection and exposition.
//!
//! # Metrics
//! - `txmon_transitions_total` (counter): status transitions by status
//! - `txmon_rebroadcasts_total` (counter): speed-ups, cancels and losses
//! - `txmon_active_watches` (gauge): transactions currently being watched
//! - `txmon_latest_block` (gauge): last block published by the ticker
//! - `txmon_rpc_failures_total` (counter): RPC calls that failed on every provider
//! - `txmon_explorer_failures_total` (counter): explorer lookups that failed open
//! - `txmon_snapshot_failures_total` (counter): persistence writes that failed
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed, so library users and tests pay nothing

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_transition(status: &'static str) {
    counter!("txmon_transitions_total", "status" => status).increment(1);
}

pub fn record_rebroadcast(kind: &'static str) {
    counter!("txmon_rebroadcasts_total", "kind" => kind).increment(1);
}

pub fn watch_started() {
    gauge!("txmon_active_watches").increment(1.0);
}

pub fn watch_finished() {
    gauge!("txmon_active_watches").decrement(1.0);
}

pub fn record_latest_block(block: u64) {
    gauge!("txmon_latest_block").set(block as f64);
}

pub fn record_rpc_failure(method: &'static str) {
    counter!("txmon_rpc_failures_total", "method" => method).increment(1);
}

pub fn record_explorer_failure() {
    counter!("txmon_explorer_failures_total").increment(1);
}

pub fn record_snapshot_failure() {
    counter!("txmon_snapshot_failures_total").increment(1);
}
