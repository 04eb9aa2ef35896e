//! Observability HTTP Routes
//!
//! Health check and relay/hub counters.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::observability::{RelayMetrics, RelayMetricsSnapshot};
use crate::realtime::{BroadcastHub, HubStats};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Metrics response
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub relay: RelayMetricsSnapshot,
    pub hub: HubStats,
}

/// State behind the metrics endpoint
pub struct ObservabilityState {
    pub hub: BroadcastHub,
    pub metrics: Arc<RelayMetrics>,
}

/// Create observability routes
pub fn observability_routes(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health check route (also available at root /health)
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_handler))
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

async fn metrics_handler(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let response = MetricsResponse {
        relay: state.metrics.snapshot(),
        hub: state.hub.stats(),
    };

    (StatusCode::OK, Json(response))
}
