use chrono::{DateTime, Utc};
use common::{BidId, ItemId, UserId};

/// Listing states of an auction lot. Items are never deleted, they only
/// transition state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Active,
    Ended,
    Cancelled,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::Ended => "ended",
            ItemStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ItemStatus::Active),
            "ended" => Some(ItemStatus::Ended),
            "cancelled" => Some(ItemStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An auction lot.
///
/// `current_highest_bid` is owned by the bid service and only ever raised
/// under the item's row lock, so it is monotonically non-decreasing while
/// the item is Active. Prices are integer minor currency units.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub seller_id: UserId,
    pub start_price: i64,
    pub current_highest_bid: i64,
    pub end_at: DateTime<Utc>,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Creates a new Active listing with no bids.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        seller_id: UserId,
        start_price: i64,
        end_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::new(),
            title: title.into(),
            description: description.into(),
            seller_id,
            start_price,
            current_highest_bid: 0,
            end_at,
            status: ItemStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single offer on an item, immutable once written.
#[derive(Debug, Clone)]
pub struct Bid {
    pub id: BidId,
    pub item_id: ItemId,
    pub user_id: UserId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}
