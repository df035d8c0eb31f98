//! Broadcast Controller
//!
//! Entry point for the broadcast session controller. Serves the booking and
//! session API, processes recording webhooks, and runs the expiry, payout,
//! and outbox background tasks.

use broadcast_controller::config::Config;
use broadcast_controller::routes::{self, AppState};
use broadcast_controller::services::{
    DestinationStatusCache, HttpMailClient, HttpPaymentsClient, HttpStreamingClient,
};
use broadcast_controller::tasks;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "broadcast_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Broadcast Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        region = %config.region,
        bind_address = %config.bind_address,
        booking_lead_time_hours = config.booking_lead_time_hours,
        "Configuration loaded successfully"
    );

    // Initialize database connection pool with query timeout
    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(&config.database_url, 5);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    info!("Database connection established");

    // Install the Prometheus metrics recorder
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| {
            error!("Failed to install metrics recorder: {}", e);
            e
        })?;

    // Provider clients
    let streaming = Arc::new(HttpStreamingClient::new(
        config.streaming_api_url.clone(),
        config.streaming_api_key.clone(),
    )?);
    let payments = Arc::new(HttpPaymentsClient::new(
        config.payments_api_url.clone(),
        config.payments_api_key.clone(),
    )?);
    let mail = Arc::new(HttpMailClient::new(
        config.mail_api_url.clone(),
        config.mail_api_key.clone(),
    )?);
    let destination_status_cache = Arc::new(DestinationStatusCache::default());

    let bind_address = config.bind_address.clone();

    // Create application state
    let state = Arc::new(AppState {
        pool: db_pool.clone(),
        config,
        streaming: streaming.clone(),
        payments: payments.clone(),
        mail: mail.clone(),
        destination_status_cache: destination_status_cache.clone(),
    });

    // Start background tasks
    let cancel_token = CancellationToken::new();

    let expiry_task = tokio::spawn(tasks::start_expiry_sweeper(
        db_pool.clone(),
        streaming,
        tasks::ExpirySweeperConfig::from_env(),
        cancel_token.clone(),
    ));
    let payout_task = tokio::spawn(tasks::start_payout_sweeper(
        db_pool.clone(),
        payments,
        destination_status_cache,
        tasks::PayoutSweeperConfig::from_env(),
        cancel_token.clone(),
    ));
    let outbox_task = tokio::spawn(tasks::start_outbox_dispatcher(
        db_pool,
        mail,
        tasks::OutboxDispatcherConfig::from_env(),
        cancel_token.clone(),
    ));

    // Build application routes
    let app = routes::build_routes(state, Some(metrics_handle));

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Broadcast Controller listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Stop background tasks and wait for their current iterations
    cancel_token.cancel();
    let _ = tokio::join!(expiry_task, payout_task, outbox_task);

    info!("Broadcast Controller shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    // Graceful shutdown drain period
    let drain_secs: u64 = std::env::var("BC_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (BC_DRAIN_SECONDS=0)");
    }
}

/// Adds statement_timeout to the database URL.
/// This ensures queries don't hang indefinitely.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}
