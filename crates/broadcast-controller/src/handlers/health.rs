//! Health, readiness, and metrics endpoints.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Handler for GET /health
///
/// Liveness probe: always 200 while the process is serving.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Handler for GET /ready
///
/// Readiness probe: verifies database connectivity.
#[instrument(skip_all, name = "bc.health.ready")]
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                region: state.config.region.clone(),
                database: Some("connected".to_string()),
            }),
        ),
        Err(e) => {
            warn!(target: "bc.handlers.health", error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    region: state.config.region.clone(),
                    database: Some("disconnected".to_string()),
                }),
            )
        }
    }
}

/// Handler for GET /metrics
///
/// Renders Prometheus metrics in text exposition format.
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
