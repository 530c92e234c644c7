//! Relay router configuration

use super::metrics_handler::metrics_handler;
use super::relay::{websocket_handler, RelayState};
use axum::{extract::State, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
}

pub async fn health_check(State(state): State<Arc<RelayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.connection_count().await,
    })
}

/// Build the relay router
///
/// `/metrics` is only mounted when a Prometheus recorder is installed.
pub fn build_router(state: Arc<RelayState>, prometheus_handle: Option<PrometheusHandle>) -> Router {
    let relay_routes = Router::new()
        .route("/signaling/:participant_id", get(websocket_handler))
        .route("/health", get(health_check))
        .with_state(state);

    let router = match prometheus_handle {
        Some(handle) => relay_routes.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(handle),
        ),
        None => relay_routes,
    };

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
