//! In-memory stats store for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventId, UserId};
use storage::{Result, StoreError, TxManager};

use crate::model::UserStats;
use crate::store::StatsStore;

#[derive(Clone, Default)]
pub struct InMemoryStatsStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    fail_next_commit: AtomicBool,
}

#[derive(Default)]
struct State {
    processed: HashSet<EventId>,
    stats: HashMap<UserId, UserStats>,
}

/// Staged transaction over the in-memory stats store.
pub struct MemStatsTx {
    staged: Vec<StagedWrite>,
}

enum StagedWrite {
    MarkProcessed(EventId),
    ApplyBid {
        user_id: UserId,
        amount: i64,
        bid_at: DateTime<Utc>,
    },
}

impl InMemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `commit` fail, simulating a transient store outage.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of deduplication receipts held.
    pub fn processed_count(&self) -> usize {
        self.inner.state.lock().unwrap().processed.len()
    }

    fn apply(state: &mut State, write: StagedWrite) {
        match write {
            StagedWrite::MarkProcessed(event_id) => {
                state.processed.insert(event_id);
            }
            StagedWrite::ApplyBid {
                user_id,
                amount,
                bid_at,
            } => {
                let now = Utc::now();
                state
                    .stats
                    .entry(user_id)
                    .and_modify(|s| {
                        s.total_bids_placed += 1;
                        s.total_amount_bid += amount;
                        s.last_bid_at = s.last_bid_at.max(bid_at);
                        s.updated_at = now;
                    })
                    .or_insert(UserStats {
                        user_id,
                        total_bids_placed: 1,
                        total_amount_bid: amount,
                        last_bid_at: bid_at,
                        created_at: now,
                        updated_at: now,
                    });
            }
        }
    }
}

#[async_trait]
impl TxManager for InMemoryStatsStore {
    type Tx = MemStatsTx;

    async fn begin(&self) -> Result<MemStatsTx> {
        Ok(MemStatsTx { staged: Vec::new() })
    }

    async fn commit(&self, mut tx: MemStatsTx) -> Result<()> {
        if self.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::TransactionFailed(
                "simulated commit failure".to_string(),
            ));
        }

        let mut state = self.inner.state.lock().unwrap();
        for write in tx.staged.drain(..) {
            Self::apply(&mut state, write);
        }
        Ok(())
    }

    async fn rollback(&self, tx: MemStatsTx) -> Result<()> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl StatsStore for InMemoryStatsStore {
    async fn is_event_processed(&self, _tx: &mut MemStatsTx, event_id: EventId) -> Result<bool> {
        Ok(self.inner.state.lock().unwrap().processed.contains(&event_id))
    }

    async fn mark_event_processed(&self, tx: &mut MemStatsTx, event_id: EventId) -> Result<()> {
        tx.staged.push(StagedWrite::MarkProcessed(event_id));
        Ok(())
    }

    async fn apply_bid_placed(
        &self,
        tx: &mut MemStatsTx,
        user_id: UserId,
        amount: i64,
        bid_at: DateTime<Utc>,
    ) -> Result<()> {
        tx.staged.push(StagedWrite::ApplyBid {
            user_id,
            amount,
            bid_at,
        });
        Ok(())
    }

    async fn get_user_stats(&self, user_id: UserId) -> Result<Option<UserStats>> {
        Ok(self.inner.state.lock().unwrap().stats.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staged_writes_apply_on_commit_only() {
        let store = InMemoryStatsStore::new();
        let user = UserId::new();
        let event = EventId::new();

        let mut tx = store.begin().await.unwrap();
        store
            .apply_bid_placed(&mut tx, user, 5_000, Utc::now())
            .await
            .unwrap();
        store.mark_event_processed(&mut tx, event).await.unwrap();
        assert!(store.get_user_stats(user).await.unwrap().is_none());
        assert_eq!(store.processed_count(), 0);

        store.commit(tx).await.unwrap();
        assert!(store.get_user_stats(user).await.unwrap().is_some());
        assert_eq!(store.processed_count(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_receipt_and_upsert_together() {
        let store = InMemoryStatsStore::new();
        let user = UserId::new();
        let event = EventId::new();

        let mut tx = store.begin().await.unwrap();
        store
            .apply_bid_placed(&mut tx, user, 5_000, Utc::now())
            .await
            .unwrap();
        store.mark_event_processed(&mut tx, event).await.unwrap();
        store.rollback(tx).await.unwrap();

        assert!(store.get_user_stats(user).await.unwrap().is_none());
        let mut tx = store.begin().await.unwrap();
        assert!(!store.is_event_processed(&mut tx, event).await.unwrap());
    }
}
