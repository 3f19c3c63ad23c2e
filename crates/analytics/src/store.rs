use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventId, UserId};
use storage::{Result, TxManager};

use crate::UserStats;

/// Persistence contract for the analytics service.
///
/// `apply_bid_placed` and `mark_event_processed` always run inside one
/// transaction: either the aggregate moves and the receipt exists, or
/// neither does.
#[async_trait]
pub trait StatsStore: TxManager {
    /// The deduplication gate: has this event already contributed?
    async fn is_event_processed(&self, tx: &mut Self::Tx, event_id: EventId) -> Result<bool>;

    /// Records the deduplication receipt.
    async fn mark_event_processed(&self, tx: &mut Self::Tx, event_id: EventId) -> Result<()>;

    /// Upserts one bid into the user's aggregate: first occurrence inserts
    /// `{1, amount, bid_at}`; a conflict increments the count, adds the
    /// amount and keeps the later of the two `last_bid_at` instants.
    async fn apply_bid_placed(
        &self,
        tx: &mut Self::Tx,
        user_id: UserId,
        amount: i64,
        bid_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Plain read of a user's aggregate.
    async fn get_user_stats(&self, user_id: UserId) -> Result<Option<UserStats>>;
}
