//! Operator-facing HTTP surface: `/healthz` and `/metrics`.
//!
//! There is no client-facing completions route — routing happens through
//! [`meridian_router::gateway::Gateway`] directly, called from whatever
//! embeds this crate, not through this HTTP server. This server exists only
//! so an operator (or a Kubernetes liveness probe, or a Prometheus scraper)
//! can observe the gateway from the outside.

use crate::gateway_error::GatewayError;
use crate::metrics;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use meridian_router::gateway::Gateway;
use meridian_router::health::Status;
use serde_json::json;
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

pub fn create_server(gateway: Arc<Gateway>, request_timeout: std::time::Duration) -> Router {
    let state = AppState { gateway };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Result<impl IntoResponse, GatewayError> {
    let mut providers = json!({});
    let mut all_healthy = true;

    for name in state.gateway.registered_providers().await {
        let health = state.gateway.provider_health(&name).await;
        let status = health.as_ref().map(|h| h.status).unwrap_or(Status::Unknown);
        if !matches!(status, Status::Healthy) {
            all_healthy = false;
        }
        providers[&name] = json!({
            "status": format!("{status:?}").to_lowercase(),
            "consecutive_failures": health.as_ref().map(|h| h.consecutive_failures).unwrap_or(0),
            "total_errors": health.as_ref().map(|h| h.total_errors).unwrap_or(0),
        });
    }

    let body = json!({
        "status": if all_healthy { "healthy" } else { "degraded" },
        "providers": providers,
    });
    Ok(Json(body))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    metrics::render(&state.gateway).await
}
