//! In-memory outbox store for tests.
//!
//! Transactions stage their writes and apply them on commit; dropping an
//! uncommitted transaction releases its claims and discards the staging
//! buffer, which is exactly the rollback the relay relies on.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;
use storage::{Result, StoreError, TxManager};

use crate::{OutboxEvent, OutboxStatus, store::OutboxStore};

#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    fail_next_commit: AtomicBool,
}

#[derive(Default)]
struct State {
    events: Vec<OutboxEvent>,
    claimed: HashSet<EventId>,
}

/// Staged transaction over the in-memory store.
pub struct MemOutboxTx {
    inner: Arc<Inner>,
    staged: Vec<StagedWrite>,
    claims: Vec<EventId>,
    committed: bool,
}

enum StagedWrite {
    Insert(OutboxEvent),
    Status {
        event_id: EventId,
        status: OutboxStatus,
        processed_at: Option<DateTime<Utc>>,
    },
}

impl Drop for MemOutboxTx {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.inner.state.lock().unwrap();
            for id in &self.claims {
                state.claimed.remove(id);
            }
        }
    }
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `commit` fail, simulating a crash after publish but
    /// before the status update lands.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Returns a committed event by id.
    pub fn get(&self, event_id: EventId) -> Option<OutboxEvent> {
        let state = self.inner.state.lock().unwrap();
        state.events.iter().find(|e| e.id == event_id).cloned()
    }

    /// Returns all committed events, oldest first.
    pub fn all(&self) -> Vec<OutboxEvent> {
        let mut events = self.inner.state.lock().unwrap().events.clone();
        events.sort_by_key(|e| e.created_at);
        events
    }

    /// Number of committed rows currently Pending.
    pub fn pending_count(&self) -> usize {
        let state = self.inner.state.lock().unwrap();
        state
            .events
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending)
            .count()
    }

    fn apply(state: &mut State, write: StagedWrite) {
        match write {
            StagedWrite::Insert(event) => state.events.push(event),
            StagedWrite::Status {
                event_id,
                status,
                processed_at,
            } => {
                if let Some(event) = state.events.iter_mut().find(|e| e.id == event_id) {
                    event.status = status;
                    event.processed_at = processed_at;
                }
            }
        }
    }
}

#[async_trait]
impl TxManager for InMemoryOutboxStore {
    type Tx = MemOutboxTx;

    async fn begin(&self) -> Result<MemOutboxTx> {
        Ok(MemOutboxTx {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
            claims: Vec::new(),
            committed: false,
        })
    }

    async fn commit(&self, mut tx: MemOutboxTx) -> Result<()> {
        if self.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            // Dropping `tx` releases the claims, as an aborted transaction
            // would.
            return Err(StoreError::TransactionFailed(
                "simulated commit failure".to_string(),
            ));
        }

        tx.committed = true;
        let mut state = self.inner.state.lock().unwrap();
        for write in tx.staged.drain(..) {
            Self::apply(&mut state, write);
        }
        for id in tx.claims.drain(..) {
            state.claimed.remove(&id);
        }
        Ok(())
    }

    async fn rollback(&self, tx: MemOutboxTx) -> Result<()> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn save_event(&self, tx: &mut MemOutboxTx, event: &OutboxEvent) -> Result<()> {
        tx.staged.push(StagedWrite::Insert(event.clone()));
        Ok(())
    }

    async fn claim_pending(&self, tx: &mut MemOutboxTx, limit: u32) -> Result<Vec<OutboxEvent>> {
        let mut state = self.inner.state.lock().unwrap();

        let mut candidates: Vec<OutboxEvent> = state
            .events
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
            tx.staged.push(StagedWrite::Status {
                event_id: event.id,
                status: OutboxStatus::Processing,
                processed_at: None,
            });
        }

        Ok(candidates)
    }

    async fn mark_status(
        &self,
        tx: &mut MemOutboxTx,
        event_id: EventId,
        status: OutboxStatus,
    ) -> Result<()> {
        let known_committed = {
            let state = self.inner.state.lock().unwrap();
            state.events.iter().any(|e| e.id == event_id)
        };
        let known_staged = tx.staged.iter().any(
            |w| matches!(w, StagedWrite::Insert(e) if e.id == event_id),
        );
        if !known_committed && !known_staged {
            return Err(StoreError::NotFound);
        }

        tx.staged.push(StagedWrite::Status {
            event_id,
            status,
            processed_at: status.is_terminal().then(Utc::now),
        });
        Ok(())
    }
}
