//! In-memory bid store for tests.
//!
//! Row locks are one `tokio::sync::Mutex` per item, acquired under the
//! configured lock timeout; the guard lives inside the transaction handle,
//! so the lock releases exactly when the transaction commits or drops.
//! Writes stage in the transaction and apply on commit.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventId, ItemId};
use outbox::{OutboxEvent, OutboxStatus, OutboxStore};
use storage::{Result, StoreError, TxManager};
use tokio::sync::OwnedMutexGuard;

use crate::model::{Bid, Item};
use crate::store::BidStore;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct InMemoryBidStore {
    inner: Arc<Inner>,
    lock_timeout: Duration,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    row_locks: Mutex<HashMap<ItemId, Arc<tokio::sync::Mutex<()>>>>,
    fail_next_commit: AtomicBool,
}

#[derive(Default)]
struct State {
    items: HashMap<ItemId, Item>,
    bids: Vec<Bid>,
    outbox: Vec<OutboxEvent>,
    claimed: HashSet<EventId>,
}

/// Staged transaction over the in-memory bid store.
pub struct MemBidTx {
    inner: Arc<Inner>,
    staged: Vec<StagedWrite>,
    // Held guards serialize bidders; released on commit or drop.
    row_guards: Vec<OwnedMutexGuard<()>>,
    claims: Vec<EventId>,
    committed: bool,
}

enum StagedWrite {
    InsertItem(Item),
    InsertBid(Bid),
    HighestBid {
        item_id: ItemId,
        amount: i64,
        at: DateTime<Utc>,
    },
    InsertEvent(OutboxEvent),
    EventStatus {
        event_id: EventId,
        status: OutboxStatus,
        processed_at: Option<DateTime<Utc>>,
    },
}

impl Drop for MemBidTx {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.inner.state.lock().unwrap();
            for id in &self.claims {
                state.claimed.remove(id);
            }
        }
    }
}

impl Default for InMemoryBidStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBidStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            lock_timeout,
        }
    }

    /// Makes the next `commit` fail, for exercising the no-partial-effect
    /// guarantee.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// All committed outbox rows, oldest first.
    pub fn outbox_events(&self) -> Vec<OutboxEvent> {
        let mut events = self.inner.state.lock().unwrap().outbox.clone();
        events.sort_by_key(|e| e.created_at);
        events
    }

    fn apply(state: &mut State, write: StagedWrite) {
        match write {
            StagedWrite::InsertItem(item) => {
                state.items.insert(item.id, item);
            }
            StagedWrite::InsertBid(bid) => state.bids.push(bid),
            StagedWrite::HighestBid { item_id, amount, at } => {
                if let Some(item) = state.items.get_mut(&item_id) {
                    item.current_highest_bid = amount;
                    item.updated_at = at;
                }
            }
            StagedWrite::InsertEvent(event) => state.outbox.push(event),
            StagedWrite::EventStatus {
                event_id,
                status,
                processed_at,
            } => {
                if let Some(event) = state.outbox.iter_mut().find(|e| e.id == event_id) {
                    event.status = status;
                    event.processed_at = processed_at;
                }
            }
        }
    }
}

#[async_trait]
impl TxManager for InMemoryBidStore {
    type Tx = MemBidTx;

    async fn begin(&self) -> Result<MemBidTx> {
        Ok(MemBidTx {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
            row_guards: Vec::new(),
            claims: Vec::new(),
            committed: false,
        })
    }

    async fn commit(&self, mut tx: MemBidTx) -> Result<()> {
        if self.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::TransactionFailed(
                "simulated commit failure".to_string(),
            ));
        }

        tx.committed = true;
        {
            let mut state = self.inner.state.lock().unwrap();
            for write in tx.staged.drain(..) {
                Self::apply(&mut state, write);
            }
            for id in tx.claims.drain(..) {
                state.claimed.remove(&id);
            }
        }
        // Row guards release here, after the writes are visible.
        drop(tx);
        Ok(())
    }

    async fn rollback(&self, tx: MemBidTx) -> Result<()> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryBidStore {
    async fn save_event(&self, tx: &mut MemBidTx, event: &OutboxEvent) -> Result<()> {
        tx.staged.push(StagedWrite::InsertEvent(event.clone()));
        Ok(())
    }

    async fn claim_pending(&self, tx: &mut MemBidTx, limit: u32) -> Result<Vec<OutboxEvent>> {
        let mut state = self.inner.state.lock().unwrap();

        let mut candidates: Vec<OutboxEvent> = state
            .outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending && !state.claimed.contains(&e.id))
            .cloned()
            .collect();
        candidates.sort_by_key(|e| e.created_at);
        candidates.truncate(limit as usize);

        for event in &mut candidates {
            state.claimed.insert(event.id);
            tx.claims.push(event.id);
            event.status = OutboxStatus::Processing;
            tx.staged.push(StagedWrite::EventStatus {
                event_id: event.id,
                status: OutboxStatus::Processing,
                processed_at: None,
            });
        }

        Ok(candidates)
    }

    async fn mark_status(
        &self,
        tx: &mut MemBidTx,
        event_id: EventId,
        status: OutboxStatus,
    ) -> Result<()> {
        let known = {
            let state = self.inner.state.lock().unwrap();
            state.outbox.iter().any(|e| e.id == event_id)
        } || tx
            .staged
            .iter()
            .any(|w| matches!(w, StagedWrite::InsertEvent(e) if e.id == event_id));
        if !known {
            return Err(StoreError::NotFound);
        }

        tx.staged.push(StagedWrite::EventStatus {
            event_id,
            status,
            processed_at: status.is_terminal().then(Utc::now),
        });
        Ok(())
    }
}

#[async_trait]
impl BidStore for InMemoryBidStore {
    async fn insert_item(&self, tx: &mut MemBidTx, item: &Item) -> Result<()> {
        tx.staged.push(StagedWrite::InsertItem(item.clone()));
        Ok(())
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        let state = self.inner.state.lock().unwrap();
        Ok(state.items.get(&item_id).cloned())
    }

    async fn get_item_for_update(&self, tx: &mut MemBidTx, item_id: ItemId) -> Result<Item> {
        let lock = {
            let mut locks = self.inner.row_locks.lock().unwrap();
            Arc::clone(
                locks
                    .entry(item_id)
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };

        let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout)?;
        tx.row_guards.push(guard);

        let state = self.inner.state.lock().unwrap();
        state.items.get(&item_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn save_bid(&self, tx: &mut MemBidTx, bid: &Bid) -> Result<()> {
        tx.staged.push(StagedWrite::InsertBid(bid.clone()));
        Ok(())
    }

    async fn update_highest_bid(
        &self,
        tx: &mut MemBidTx,
        item_id: ItemId,
        amount: i64,
    ) -> Result<()> {
        let known = {
            let state = self.inner.state.lock().unwrap();
            state.items.contains_key(&item_id)
        } || tx
            .staged
            .iter()
            .any(|w| matches!(w, StagedWrite::InsertItem(i) if i.id == item_id));
        if !known {
            return Err(StoreError::NotFound);
        }

        tx.staged.push(StagedWrite::HighestBid {
            item_id,
            amount,
            at: Utc::now(),
        });
        Ok(())
    }

    async fn list_bids_for_item(&self, item_id: ItemId) -> Result<Vec<Bid>> {
        let state = self.inner.state.lock().unwrap();
        let mut bids: Vec<Bid> = state
            .bids
            .iter()
            .filter(|b| b.item_id == item_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bids)
    }
}
