//! Analytics: per-user bidding statistics materialized from the
//! `bid.placed` stream.
//!
//! The bus delivers at least once, so the consumer is idempotent: every
//! aggregate mutation commits together with a deduplication receipt, and a
//! redelivered event is recognized by its receipt and acknowledged without
//! effect.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use consumer::{BidEventConsumer, BidPlacedEvent};
pub use error::ConsumerError;
pub use memory::InMemoryStatsStore;
pub use model::UserStats;
pub use postgres::PostgresStatsStore;
pub use store::StatsStore;
