//! Metrics collection and exposition.
//!
//! # Metrics
//! - `alpn_handshakes_total` (counter): TLS handshakes by outcome
//! - `alpn_negotiations_total` (counter): installed stacks by protocol
//! - `alpn_negotiation_failures_total` (counter): negotiation failures by reason
//! - `alpn_active_connections` (gauge): current connection count
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::negotiation::Protocol;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_handshake(outcome: &'static str) {
    counter!("alpn_handshakes_total", "outcome" => outcome).increment(1);
}

pub fn record_negotiation(protocol: &Protocol) {
    counter!("alpn_negotiations_total", "protocol" => protocol.to_string()).increment(1);
}

pub fn record_negotiation_failure(reason: &'static str) {
    counter!("alpn_negotiation_failures_total", "reason" => reason).increment(1);
}

pub fn record_connection_opened() {
    gauge!("alpn_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("alpn_active_connections").decrement(1.0);
}
