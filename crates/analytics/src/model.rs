use chrono::{DateTime, Utc};
use common::UserId;

/// Per-user bidding aggregate.
///
/// Upserted atomically with the processed-event receipt, so each event
/// contributes exactly once no matter how often it is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStats {
    pub user_id: UserId,
    pub total_bids_placed: i64,
    pub total_amount_bid: i64,
    pub last_bid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
