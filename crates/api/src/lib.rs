//! HTTP adapter over the bidding and analytics services.
//!
//! The RPC surface is deliberately thin: it parses identifiers, calls the
//! domain services and maps the typed errors onto status codes. Routes,
//! observability layers and state wiring follow one shape across the
//! three binaries (API server, relay worker, stats worker).

pub mod config;
pub mod error;
pub mod routes;
pub mod signals;

use std::sync::Arc;

use analytics::{InMemoryStatsStore, StatsStore};
use axum::Router;
use axum::routing::{get, post};
use bidding::{BidService, BidStore, InMemoryBidStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: BidStore, T: StatsStore> {
    pub bid_service: BidService<S>,
    pub stats_store: T,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, T>(state: Arc<AppState<S, T>>, metrics_handle: PrometheusHandle) -> Router
where
    S: BidStore + 'static,
    T: StatsStore + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/items", post(routes::items::create::<S, T>))
        .route("/items/{id}", get(routes::items::get::<S, T>))
        .route("/items/{id}/bids", post(routes::items::place_bid::<S, T>))
        .route("/items/{id}/bids", get(routes::items::list_bids::<S, T>))
        .route("/users/{id}/stats", get(routes::stats::get::<S, T>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over the in-memory stores, returning the
/// store handles so tests can wire the relay and consumer around them.
pub fn memory_state() -> (
    Arc<AppState<InMemoryBidStore, InMemoryStatsStore>>,
    InMemoryBidStore,
    InMemoryStatsStore,
) {
    let bid_store = InMemoryBidStore::new();
    let stats_store = InMemoryStatsStore::new();
    let state = Arc::new(AppState {
        bid_service: BidService::new(bid_store.clone()),
        stats_store: stats_store.clone(),
    });
    (state, bid_store, stats_store)
}
