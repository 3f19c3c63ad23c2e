//! Bid API server entry point.

use std::sync::Arc;

use analytics::PostgresStatsStore;
use api::{AppState, Config};
use bidding::{BidService, PostgresBidStore};
use storage::PgSession;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();
    let session = PgSession::connect(
        config.require_store_url(),
        config.db_max_connections,
        config.lock_timeout,
    )
    .await
    .expect("failed to connect to store");

    let bid_store = PostgresBidStore::new(session.clone());
    bid_store
        .run_migrations()
        .await
        .expect("failed to run migrations");

    let state = Arc::new(AppState {
        bid_service: BidService::new(bid_store),
        stats_store: PostgresStatsStore::new(session),
    });

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting bid API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(api::signals::shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
