//! Bid placement: lock, validate, write bid + highest + outbox, commit.

use chrono::{DateTime, Utc};
use common::{BidId, ItemId, UserId};
use events::{BID_PLACED, BidPlaced, to_timestamp};
use outbox::OutboxEvent;
use storage::StoreError;

use crate::error::BidError;
use crate::model::{Bid, Item};
use crate::store::BidStore;

/// Command to place a bid on an item.
#[derive(Debug, Clone, Copy)]
pub struct PlaceBid {
    pub item_id: ItemId,
    pub user_id: UserId,
    pub amount: i64,
}

/// The bidding engine.
///
/// All mutations of an item's `current_highest_bid` flow through
/// [`place_bid`](BidService::place_bid), which serializes them on the
/// item's row lock.
pub struct BidService<S: BidStore> {
    store: S,
}

impl<S: BidStore> BidService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places a bid. Returns the newly recorded [`Bid`] on success.
    ///
    /// The bid row, the raised highest bid and the `bid.placed` outbox row
    /// commit atomically; on any failure none of the three exist.
    #[tracing::instrument(
        skip(self),
        fields(item_id = %cmd.item_id, user_id = %cmd.user_id, amount = cmd.amount)
    )]
    pub async fn place_bid(&self, cmd: PlaceBid) -> Result<Bid, BidError> {
        let mut tx = self.store.begin().await?;

        // The row lock taken here is the serializing primitive: no other
        // bidder can read-then-raise current_highest_bid on this item
        // until the transaction commits or rolls back.
        let item = self
            .store
            .get_item_for_update(&mut tx, cmd.item_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => BidError::ItemNotFound(cmd.item_id),
                other => other.into(),
            })?;

        let now = Utc::now();
        validate_bid(&item, &cmd, now)?;

        let bid = Bid {
            id: BidId::new(),
            item_id: cmd.item_id,
            user_id: cmd.user_id,
            amount: cmd.amount,
            created_at: now,
        };
        self.store.save_bid(&mut tx, &bid).await?;
        self.store
            .update_highest_bid(&mut tx, cmd.item_id, cmd.amount)
            .await?;

        let body = BidPlaced {
            bid_id: bid.id.to_string(),
            item_id: bid.item_id.to_string(),
            user_id: bid.user_id.to_string(),
            amount: bid.amount,
            timestamp: Some(to_timestamp(now)),
        };
        let event = OutboxEvent::pending(BID_PLACED, body.encode_payload(), now);
        self.store.save_event(&mut tx, &event).await?;

        self.store.commit(tx).await?;

        metrics::counter!("bids_placed").increment(1);
        tracing::info!(bid_id = %bid.id, "bid placed");
        Ok(bid)
    }

    /// Creates a new listing (seller flow).
    #[tracing::instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn create_item(&self, item: Item) -> Result<Item, BidError> {
        let mut tx = self.store.begin().await?;
        self.store.insert_item(&mut tx, &item).await?;
        self.store.commit(tx).await?;
        Ok(item)
    }

    /// Loads an item by id.
    pub async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, BidError> {
        Ok(self.store.get_item(item_id).await?)
    }

    /// Lists the bids on an item, newest first.
    pub async fn list_bids(&self, item_id: ItemId) -> Result<Vec<Bid>, BidError> {
        Ok(self.store.list_bids_for_item(item_id).await?)
    }
}

/// Validates a bid against the locked item, short-circuiting on the first
/// failure. The checks run in a fixed order so clients see stable errors.
fn validate_bid(item: &Item, cmd: &PlaceBid, now: DateTime<Utc>) -> Result<(), BidError> {
    if item.seller_id == cmd.user_id {
        return Err(BidError::SellerCannotBid);
    }
    if cmd.amount <= 0 {
        return Err(BidError::InvalidBidAmount(cmd.amount));
    }
    // Strict inequality: matching the current highest is rejected.
    if cmd.amount <= item.current_highest_bid {
        return Err(BidError::BidTooLow {
            amount: cmd.amount,
            current_highest: item.current_highest_bid,
        });
    }
    if now >= item.end_at {
        return Err(BidError::AuctionEnded);
    }
    Ok(())
}
