//! Prometheus metrics handler

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics exporter
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // Describe metrics
    describe_gauge!(
        "meshcall_relay_connections",
        "Number of open relay WebSocket connections"
    );
    describe_counter!(
        "meshcall_relay_messages_total",
        "Total number of signaling messages received by the relay"
    );
    describe_gauge!(
        "meshcall_peer_sessions",
        "Number of live peer sessions held by the client"
    );
    describe_counter!(
        "meshcall_offers_sent_total",
        "Total number of offers sent"
    );
    describe_counter!(
        "meshcall_negotiation_failures_total",
        "Total number of peer sessions closed by a failure"
    );
    describe_counter!(
        "meshcall_candidates_queued_total",
        "Total number of candidates held until the remote description was applied"
    );

    Ok(handle)
}

/// HTTP metrics handler
pub async fn metrics_handler(State(prometheus_handle): State<PrometheusHandle>) -> Response {
    let metrics = prometheus_handle.render();
    (StatusCode::OK, metrics).into_response()
}
