pub mod types;

pub use types::{BidId, EventId, ItemId, UserId};
