//! End-to-end relay scenarios over the in-memory store and broker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use messaging::{InMemoryBroker, Subscriber};
use outbox::{InMemoryOutboxStore, OutboxEvent, OutboxRelay, OutboxStatus, OutboxStore, RelayConfig};
use storage::TxManager;
use tokio::sync::watch;

async fn seed_pending(store: &InMemoryOutboxStore, event_type: &str, payload: &[u8]) -> OutboxEvent {
    let event = OutboxEvent::pending(event_type, payload.to_vec(), Utc::now());
    let mut tx = store.begin().await.unwrap();
    store.save_event(&mut tx, &event).await.unwrap();
    store.commit(tx).await.unwrap();
    event
}

#[tokio::test]
async fn pending_event_reaches_the_bus_within_two_poll_intervals() {
    let store = InMemoryOutboxStore::new();
    let broker = InMemoryBroker::new();
    let mut subscription = broker.subscribe("relay_test", "bid.*").await.unwrap();

    let payload = b"opaque-bid-payload".to_vec();
    let event = seed_pending(&store, "bid.placed", &payload).await;

    let poll_interval = Duration::from_millis(50);
    let relay = Arc::new(OutboxRelay::new(
        store.clone(),
        broker.clone(),
        RelayConfig {
            poll_interval,
            ..RelayConfig::default()
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move { relay.run(shutdown_rx).await }
    });

    // One delivery, correct routing key, body byte-identical to the seeded
    // payload, within 2x the poll interval.
    let delivery = tokio::time::timeout(poll_interval * 2, subscription.recv())
        .await
        .expect("no delivery within 2x poll_interval")
        .unwrap();
    assert_eq!(delivery.routing_key, "bid.placed");
    assert_eq!(delivery.payload, payload);
    delivery.ack().await.unwrap();

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    let stored = store.get(event.id).unwrap();
    assert_eq!(stored.status, OutboxStatus::Published);
    assert!(stored.processed_at.is_some());
}

#[tokio::test]
async fn relay_preserves_created_at_order_per_event_type() {
    let store = InMemoryOutboxStore::new();
    let broker = InMemoryBroker::new();
    let mut subscription = broker.subscribe("relay_order", "bid.*").await.unwrap();

    let base = Utc::now();
    for i in 0..5u8 {
        let mut event = OutboxEvent::pending("bid.placed", vec![i], base);
        event.created_at = base + chrono::Duration::milliseconds(i64::from(i));
        let mut tx = store.begin().await.unwrap();
        store.save_event(&mut tx, &event).await.unwrap();
        store.commit(tx).await.unwrap();
    }

    let relay = OutboxRelay::new(store.clone(), broker.clone(), RelayConfig::default());
    relay.process_batch().await.unwrap();

    for expected in 0..5u8 {
        let delivery = subscription.recv().await.unwrap();
        assert_eq!(delivery.payload, vec![expected]);
        delivery.ack().await.unwrap();
    }
}

#[tokio::test]
async fn killed_relay_leaves_no_event_behind() {
    // Crash-safety: aborting the relay mid-stream never loses a Pending
    // event and never republishes a Published one.
    let store = InMemoryOutboxStore::new();
    let broker = InMemoryBroker::new();
    let mut subscription = broker.subscribe("relay_crash", "bid.*").await.unwrap();

    let first = seed_pending(&store, "bid.placed", b"first").await;

    // First relay instance publishes and is then "killed".
    {
        let relay = OutboxRelay::new(store.clone(), broker.clone(), RelayConfig::default());
        relay.process_batch().await.unwrap();
    }
    assert_eq!(store.get(first.id).unwrap().status, OutboxStatus::Published);

    let second = seed_pending(&store, "bid.placed", b"second").await;

    // A restarted relay picks up only the un-published event.
    let relay = OutboxRelay::new(store.clone(), broker.clone(), RelayConfig::default());
    relay.process_batch().await.unwrap();
    assert_eq!(store.get(second.id).unwrap().status, OutboxStatus::Published);

    let d1 = subscription.recv().await.unwrap();
    assert_eq!(d1.payload, b"first");
    d1.ack().await.unwrap();
    let d2 = subscription.recv().await.unwrap();
    assert_eq!(d2.payload, b"second");
    d2.ack().await.unwrap();

    // Nothing else was published.
    assert_eq!(broker.pending("relay_crash"), 0);
    assert_eq!(store.pending_count(), 0);
}
