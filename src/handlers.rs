use axum::{
    extract::{ConnectInfo, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::ImageApi;
use crate::config::Config;
use crate::health::HealthChecker;
use crate::key_generator::KeyGenerator;
use crate::metrics::MetricsCollector;
use crate::params::Params;

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Everything a request needs, built once at start-up
pub struct AppState {
    pub config: Arc<Config>,
    pub api: ImageApi,
    pub metrics: MetricsCollector,
    pub health: HealthChecker,
}

/// The image endpoint: `GET /?url=...&w=...`
pub async fn serve_image(
    State(state): State<SharedState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let identity = KeyGenerator::client_identity(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_headers,
    );
    let params = Params::new(query);

    let outcome = state.api.handle(&params, &identity).await;
    match outcome.failure {
        Some(kind) => state.metrics.record_failure(kind).await,
        None => state.metrics.record_served().await,
    }
    outcome.response
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.health.check_health().await)
}

/// Request counters
pub async fn metrics(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.metrics.snapshot().await)
}
