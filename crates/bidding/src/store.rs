use async_trait::async_trait;
use common::ItemId;
use outbox::OutboxStore;
use storage::Result;

use crate::{Bid, Item};

/// Persistence contract for the bid service.
///
/// Extends [`OutboxStore`] because the `bid.placed` outbox row must land
/// in the same transaction as the bid itself.
#[async_trait]
pub trait BidStore: OutboxStore {
    /// Inserts a new listing (seller flow).
    async fn insert_item(&self, tx: &mut Self::Tx, item: &Item) -> Result<()>;

    /// Plain read of an item, outside any transaction.
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>>;

    /// Reads an item under an exclusive row lock (`SELECT … FOR UPDATE`).
    ///
    /// Blocks other bidders on the same item until the transaction commits
    /// or rolls back; fails with [`StoreError::LockTimeout`] when the lock
    /// cannot be acquired within the transaction's lock timeout, and with
    /// [`StoreError::NotFound`] when no such row exists.
    ///
    /// [`StoreError::LockTimeout`]: storage::StoreError::LockTimeout
    /// [`StoreError::NotFound`]: storage::StoreError::NotFound
    async fn get_item_for_update(&self, tx: &mut Self::Tx, item_id: ItemId) -> Result<Item>;

    /// Persists a bid.
    async fn save_bid(&self, tx: &mut Self::Tx, bid: &Bid) -> Result<()>;

    /// Raises the item's `current_highest_bid`.
    async fn update_highest_bid(
        &self,
        tx: &mut Self::Tx,
        item_id: ItemId,
        amount: i64,
    ) -> Result<()>;

    /// All bids on an item, newest first.
    async fn list_bids_for_item(&self, item_id: ItemId) -> Result<Vec<Bid>>;
}
