//! Bid placement scenarios, including the concurrent-bidder cases.

use bidding::{BidError, BidService, InMemoryBidStore, Item, PlaceBid};
use chrono::{Duration, Utc};
use common::UserId;
use events::BidPlaced;
use outbox::OutboxStatus;
use storage::TxManager;

async fn seed_item(store: &InMemoryBidStore, item: &Item) {
    use bidding::BidStore;
    let mut tx = store.begin().await.unwrap();
    store.insert_item(&mut tx, item).await.unwrap();
    store.commit(tx).await.unwrap();
}

fn item_with(seller: UserId, start_price: i64, highest: i64) -> Item {
    let mut item = Item::new(
        "Integration lot",
        "Seeded by tests",
        seller,
        start_price,
        Utc::now() + Duration::hours(24),
    );
    item.current_highest_bid = highest;
    item
}

#[tokio::test]
async fn scenario_successful_first_bid() {
    let store = InMemoryBidStore::new();
    let service = BidService::new(store.clone());
    let seller = UserId::new();
    let bidder = UserId::new();
    let item = item_with(seller, 10_000, 0);
    seed_item(&store, &item).await;

    let bid = service
        .place_bid(PlaceBid {
            item_id: item.id,
            user_id: bidder,
            amount: 15_000,
        })
        .await
        .unwrap();

    // Exactly one bid row with the bid amount.
    let bids = service.list_bids(item.id).await.unwrap();
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].amount, 15_000);
    assert_eq!(bids[0].id, bid.id);

    // Highest bid equals the bid amount.
    let stored = service.get_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.current_highest_bid, 15_000);

    // Exactly one Pending bid.placed outbox row whose payload describes
    // the bid.
    let events = store.outbox_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "bid.placed");
    assert_eq!(events[0].status, OutboxStatus::Pending);
    let body = BidPlaced::decode_payload(&events[0].payload).unwrap();
    assert_eq!(body.bid_id, bid.id.to_string());
    assert_eq!(body.item_id, item.id.to_string());
    assert_eq!(body.user_id, bidder.to_string());
    assert_eq!(body.amount, 15_000);
}

#[tokio::test]
async fn scenario_equal_rebid_is_too_low_and_writes_nothing() {
    let store = InMemoryBidStore::new();
    let service = BidService::new(store.clone());
    let seller = UserId::new();
    let bidder = UserId::new();
    let item = item_with(seller, 10_000, 0);
    seed_item(&store, &item).await;

    service
        .place_bid(PlaceBid {
            item_id: item.id,
            user_id: bidder,
            amount: 15_000,
        })
        .await
        .unwrap();

    let result = service
        .place_bid(PlaceBid {
            item_id: item.id,
            user_id: bidder,
            amount: 15_000,
        })
        .await;

    assert!(matches!(result, Err(BidError::BidTooLow { .. })));
    assert_eq!(service.list_bids(item.id).await.unwrap().len(), 1);
    assert_eq!(store.outbox_events().len(), 1);
    assert_eq!(
        service.get_item(item.id).await.unwrap().unwrap().current_highest_bid,
        15_000
    );
}

#[tokio::test]
async fn scenario_seller_rejected_and_writes_nothing() {
    let store = InMemoryBidStore::new();
    let service = BidService::new(store.clone());
    let seller = UserId::new();
    let item = item_with(seller, 10_000, 0);
    seed_item(&store, &item).await;

    service
        .place_bid(PlaceBid {
            item_id: item.id,
            user_id: UserId::new(),
            amount: 15_000,
        })
        .await
        .unwrap();

    let result = service
        .place_bid(PlaceBid {
            item_id: item.id,
            user_id: seller,
            amount: 20_000,
        })
        .await;

    assert!(matches!(result, Err(BidError::SellerCannotBid)));
    assert_eq!(service.list_bids(item.id).await.unwrap().len(), 1);
    assert_eq!(store.outbox_events().len(), 1);
}

// Ten bidders race on one item. The test runs on the current-thread
// runtime, where tasks reach the item's fair row lock in spawn order, so
// every amount beats the previous one and all ten succeed.
#[tokio::test]
async fn scenario_ten_concurrent_bidders_serialize_on_the_row_lock() {
    let store = InMemoryBidStore::new();
    let service = std::sync::Arc::new(BidService::new(store.clone()));
    let seller = UserId::new();
    let item = item_with(seller, 50_000, 50_000);
    seed_item(&store, &item).await;

    let amounts: Vec<i64> = (0..10).map(|i| 60_000 + i * 10_000).collect();
    let mut handles = Vec::new();
    for &amount in &amounts {
        let service = std::sync::Arc::clone(&service);
        let item_id = item.id;
        handles.push(tokio::spawn(async move {
            service
                .place_bid(PlaceBid {
                    item_id,
                    user_id: UserId::new(),
                    amount,
                })
                .await
        }));
    }

    let mut succeeded = Vec::new();
    for handle in handles {
        succeeded.push(handle.await.unwrap().unwrap().amount);
    }

    // All ten succeed, every amount exactly once.
    succeeded.sort_unstable();
    assert_eq!(succeeded, amounts);

    // Final highest bid is the maximum amount.
    let stored = service.get_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.current_highest_bid, 150_000);

    // Ten bid rows, ten Pending events.
    assert_eq!(service.list_bids(item.id).await.unwrap().len(), 10);
    let events = store.outbox_events();
    assert_eq!(events.len(), 10);
    assert!(events.iter().all(|e| e.status == OutboxStatus::Pending));

    // The committed bids form a strictly increasing sequence over time
    // (list_bids returns newest first).
    let bids = service.list_bids(item.id).await.unwrap();
    let in_time_order: Vec<i64> = bids.iter().rev().map(|b| b.amount).collect();
    assert!(in_time_order.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn scenario_same_amount_race_has_one_winner() {
    let store = InMemoryBidStore::new();
    let service = std::sync::Arc::new(BidService::new(store.clone()));
    let seller = UserId::new();
    let item = item_with(seller, 50_000, 50_000);
    seed_item(&store, &item).await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = std::sync::Arc::clone(&service);
        let item_id = item.id;
        handles.push(tokio::spawn(async move {
            service
                .place_bid(PlaceBid {
                    item_id,
                    user_id: UserId::new(),
                    amount: 60_000,
                })
                .await
        }));
    }

    let mut successes = 0;
    let mut too_low = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(BidError::BidTooLow { .. }) => too_low += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1, "exactly one same-amount bid may win");
    assert_eq!(too_low, 1);
    assert_eq!(
        service.get_item(item.id).await.unwrap().unwrap().current_highest_bid,
        60_000
    );
    assert_eq!(service.list_bids(item.id).await.unwrap().len(), 1);
}
