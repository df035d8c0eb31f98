//! Shared test harness for router-level tests.
//!
//! Builds the full application router with mock provider clients and a lazy
//! database pool that never connects. Suitable for exercising every path
//! that rejects before reaching the database.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::Router;
use broadcast_controller::config::Config;
use broadcast_controller::routes::{build_routes, AppState};
use broadcast_controller::services::{
    DestinationStatusCache, MockMailClient, MockPaymentsClient, MockStreamingClient,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Webhook signing secret the test router is configured with.
pub const WEBHOOK_SECRET: &str = "whsec_router_test";

/// Build a test configuration without touching process environment.
pub fn test_config() -> Config {
    let vars = HashMap::from([
        (
            "DATABASE_URL".to_string(),
            "postgresql://bc:bc@127.0.0.1:1/bc_test".to_string(),
        ),
        ("BC_REGION".to_string(), "test-region".to_string()),
        ("STREAMING_API_KEY".to_string(), "sk_stream_test".to_string()),
        (
            "WEBHOOK_SIGNING_SECRET".to_string(),
            WEBHOOK_SECRET.to_string(),
        ),
        ("PAYMENTS_API_KEY".to_string(), "sk_pay_test".to_string()),
        ("MAIL_API_KEY".to_string(), "sk_mail_test".to_string()),
    ]);

    Config::from_vars(&vars).expect("test config should load")
}

/// Build the application router with mock providers over the given pool.
pub fn router_with_pool(pool: PgPool) -> Router {
    let state = Arc::new(AppState {
        pool,
        config: test_config(),
        streaming: Arc::new(MockStreamingClient::new()),
        payments: Arc::new(MockPaymentsClient::new()),
        mail: Arc::new(MockMailClient::new()),
        destination_status_cache: Arc::new(DestinationStatusCache::default()),
    });

    build_routes(state, None)
}

/// Build the application router with mock providers and a lazy pool.
///
/// The pool points at a closed port with a short acquire timeout, so any
/// handler that reaches the database fails fast; tests using this router
/// exercise pre-database paths or the fallback behavior on a store fault.
pub fn test_router() -> Router {
    let config = test_config();

    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(500))
        .connect_lazy(&config.database_url)
        .expect("lazy pool should build");

    router_with_pool(pool)
}
