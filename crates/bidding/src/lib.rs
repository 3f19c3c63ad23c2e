//! The bidding engine: concurrency-safe bid placement over the
//! transactional outbox.
//!
//! A bid, the raised `current_highest_bid` and the `bid.placed` outbox row
//! are written in one transaction under an exclusive row lock on the item,
//! so concurrent bidders serialize and the highest bid evolves as a
//! strictly increasing sequence.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod service;
pub mod store;

pub use error::BidError;
pub use memory::InMemoryBidStore;
pub use model::{Bid, Item, ItemStatus};
pub use postgres::PostgresBidStore;
pub use service::{BidService, PlaceBid};
pub use store::BidStore;
