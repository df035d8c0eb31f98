//! HTTP routes for the Broadcast Controller.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::services::{DestinationStatusCache, MailClient, PaymentsClient, StreamingClient};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,

    /// Service configuration.
    pub config: Config,

    /// Streaming provider client.
    pub streaming: Arc<dyn StreamingClient>,

    /// Payments provider client.
    pub payments: Arc<dyn PaymentsClient>,

    /// Transactional mail client.
    pub mail: Arc<dyn MailClient>,

    /// TTL cache of payout destination readiness.
    pub destination_status_cache: Arc<DestinationStatusCache>,
}

/// Build the application routes.
///
/// - `/health` - Liveness probe (public, unversioned)
/// - `/ready` - Readiness probe, checks the database (public, unversioned)
/// - `/metrics` - Prometheus metrics (public, unversioned)
/// - `/v1/slots` - Book a slot
/// - `/v1/slots/{id}` - Public slot view
/// - `/v1/sessions/go-live|pause|complete` - Session lifecycle
/// - `/v1/webhooks/recording` - Provider recording events
/// - `/internal/v1/accounts/{id}/reconcile` - Identity back-fill
///
/// All routes carry TraceLayer, the HTTP metrics middleware, and a 30
/// second request timeout. `metrics_handle` is `None` in tests that do not
/// install a Prometheus recorder.
pub fn build_routes(state: Arc<AppState>, metrics_handle: Option<PrometheusHandle>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/v1/slots", post(handlers::book_slot))
        .route("/v1/slots/:id", get(handlers::get_slot))
        .route("/v1/sessions/go-live", post(handlers::go_live))
        .route("/v1/sessions/pause", post(handlers::pause))
        .route("/v1/sessions/complete", post(handlers::complete))
        .route("/v1/webhooks/recording", post(handlers::recording_webhook))
        .route(
            "/internal/v1/accounts/:id/reconcile",
            post(handlers::reconcile_account),
        )
        .with_state(state);

    let router = match metrics_handle {
        Some(handle) => api_routes.merge(
            Router::new()
                .route("/metrics", get(handlers::metrics_handler))
                .with_state(handle),
        ),
        None => api_routes,
    };

    router
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
