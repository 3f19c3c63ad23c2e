//! Integration tests for the HTTP adapter, ending with the full
//! bid → outbox → relay → bus → consumer → stats pipeline over the
//! in-memory stack.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use analytics::{BidEventConsumer, InMemoryStatsStore};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bidding::InMemoryBidStore;
use chrono::{Duration as ChronoDuration, Utc};
use common::UserId;
use messaging::InMemoryBroker;
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::{OutboxRelay, RelayConfig};
use tokio::sync::watch;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, InMemoryBidStore, InMemoryStatsStore) {
    let (state, bid_store, stats_store) = api::memory_state();
    let app = api::create_app(state, get_metrics_handle());
    (app, bid_store, stats_store)
}

async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_item(app: &axum::Router, seller: UserId, start_price: i64) -> String {
    let (status, body) = request_json(
        app,
        "POST",
        "/items",
        Some(serde_json::json!({
            "title": "Integration lot",
            "description": "Seeded by tests",
            "seller_id": seller.to_string(),
            "start_price": start_price,
            "end_at": Utc::now() + ChronoDuration::hours(24),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _, _) = setup();
    let (status, body) = request_json(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_create_and_get_item() {
    let (app, _, _) = setup();
    let seller = UserId::new();
    let item_id = create_item(&app, seller, 10_000).await;

    let (status, body) = request_json(&app, "GET", &format!("/items/{item_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Integration lot");
    assert_eq!(body["current_highest_bid"], 0);
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn test_place_bid_success() {
    let (app, _, _) = setup();
    let item_id = create_item(&app, UserId::new(), 10_000).await;
    let bidder = UserId::new();

    let (status, body) = request_json(
        &app,
        "POST",
        &format!("/items/{item_id}/bids"),
        Some(serde_json::json!({ "user_id": bidder.to_string(), "amount": 15_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["amount"], 15_000);
    assert_eq!(body["item_id"], item_id);

    let (status, body) = request_json(&app, "GET", &format!("/items/{item_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_highest_bid"], 15_000);

    let (status, body) =
        request_json(&app, "GET", &format!("/items/{item_id}/bids"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_domain_rejections_map_to_stable_codes() {
    let (app, _, _) = setup();
    let seller = UserId::new();
    let item_id = create_item(&app, seller, 10_000).await;
    let bids_uri = format!("/items/{item_id}/bids");

    // Raise the highest bid to 15k.
    let (status, _) = request_json(
        &app,
        "POST",
        &bids_uri,
        Some(serde_json::json!({ "user_id": UserId::new().to_string(), "amount": 15_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Equal amount: conflict.
    let (status, _) = request_json(
        &app,
        "POST",
        &bids_uri,
        Some(serde_json::json!({ "user_id": UserId::new().to_string(), "amount": 15_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Seller: forbidden.
    let (status, _) = request_json(
        &app,
        "POST",
        &bids_uri,
        Some(serde_json::json!({ "user_id": seller.to_string(), "amount": 20_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Non-positive amount: bad request.
    let (status, _) = request_json(
        &app,
        "POST",
        &bids_uri,
        Some(serde_json::json!({ "user_id": UserId::new().to_string(), "amount": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown item: not found.
    let (status, _) = request_json(
        &app,
        "POST",
        &format!("/items/{}/bids", common::ItemId::new()),
        Some(serde_json::json!({ "user_id": UserId::new().to_string(), "amount": 20_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Malformed item id: bad request.
    let (status, _) = request_json(
        &app,
        "POST",
        "/items/not-a-uuid/bids",
        Some(serde_json::json!({ "user_id": UserId::new().to_string(), "amount": 20_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ended_auction_is_gone() {
    let (app, _, _) = setup();
    let (status, body) = request_json(
        &app,
        "POST",
        "/items",
        Some(serde_json::json!({
            "title": "Ended lot",
            "seller_id": UserId::new().to_string(),
            "start_price": 1_000,
            "end_at": Utc::now() - ChronoDuration::hours(1),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let item_id = body["id"].as_str().unwrap();

    let (status, _) = request_json(
        &app,
        "POST",
        &format!("/items/{item_id}/bids"),
        Some(serde_json::json!({ "user_id": UserId::new().to_string(), "amount": 2_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_stats_for_unknown_user_is_not_found() {
    let (app, _, _) = setup();
    let (status, _) =
        request_json(&app, "GET", &format!("/users/{}/stats", UserId::new()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let (app, _, _) = setup();
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// The whole substrate end to end: a bid placed over HTTP reaches the user
// statistics read model through outbox, relay, bus and consumer.
#[tokio::test]
async fn test_bid_to_stats_pipeline() {
    let (app, bid_store, stats_store) = setup();
    let broker = InMemoryBroker::new();

    // Start the consumer before anything is published.
    let consumer = Arc::new(BidEventConsumer::new(stats_store.clone(), "user_stats_bids"));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_handle = tokio::spawn({
        let broker = broker.clone();
        let consumer = Arc::clone(&consumer);
        async move { consumer.run(&broker, shutdown_rx).await.unwrap() }
    });
    tokio::task::yield_now().await;

    // Two bids from one user over HTTP.
    let item_id = create_item(&app, UserId::new(), 10_000).await;
    let bidder = UserId::new();
    for amount in [15_000, 25_000] {
        let (status, _) = request_json(
            &app,
            "POST",
            &format!("/items/{item_id}/bids"),
            Some(serde_json::json!({ "user_id": bidder.to_string(), "amount": amount })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // Drain the outbox onto the bus.
    let relay = OutboxRelay::new(bid_store.clone(), broker.clone(), RelayConfig::default());
    assert_eq!(relay.process_batch().await.unwrap(), 2);

    // Let the consumer work through both deliveries.
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(1)).await;
        if broker.pending("user_stats_bids") == 0 && broker.in_flight("user_stats_bids") == 0 {
            break;
        }
    }

    let (status, body) =
        request_json(&app, "GET", &format!("/users/{bidder}/stats"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_bids_placed"], 2);
    assert_eq!(body["total_amount_bid"], 40_000);

    // Nothing left Pending, nothing republished on another tick.
    assert_eq!(bid_store.outbox_events().len(), 2);
    assert_eq!(relay.process_batch().await.unwrap(), 0);

    shutdown_tx.send(true).unwrap();
    consumer_handle.await.unwrap();
}
