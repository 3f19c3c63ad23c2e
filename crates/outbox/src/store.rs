use async_trait::async_trait;
use common::EventId;
use storage::{Result, TxManager};

use crate::{OutboxEvent, OutboxStatus};

/// Persistence contract for the transactional outbox.
///
/// Implemented by every store that owns an outbox table: the bid store
/// writes events through `save_event` inside its business transactions,
/// and the relay drains them through `claim_pending` / `mark_status`.
#[async_trait]
pub trait OutboxStore: TxManager {
    /// Inserts a Pending row. Must be called with the same transaction
    /// that holds the business mutation, otherwise the outbox invariant
    /// (no event without its mutation) breaks.
    async fn save_event(&self, tx: &mut Self::Tx, event: &OutboxEvent) -> Result<()>;

    /// Atomically claims up to `limit` Pending rows, oldest first,
    /// skipping rows already held by another transaction, and stamps them
    /// Processing inside `tx`.
    ///
    /// The claim lives and dies with `tx`: a rollback reverts the rows to
    /// unclaimed Pending. Lock-skipping is what lets N parallel relays
    /// drain disjoint subsets without blocking each other.
    async fn claim_pending(&self, tx: &mut Self::Tx, limit: u32) -> Result<Vec<OutboxEvent>>;

    /// Transitions an event to `status`, stamping `processed_at` on
    /// terminal states.
    async fn mark_status(
        &self,
        tx: &mut Self::Tx,
        event_id: EventId,
        status: OutboxStatus,
    ) -> Result<()>;
}
