//! Shared event model: the binary wire contract between services.
//!
//! Payloads are protobuf-encoded (standard wire format, hand-derived
//! messages). The encoding is self-describing at the field level: decoders
//! skip unknown tags, so new fields can be added as `optional` without
//! breaking old consumers, and removed fields leave their tag retired.
//!
//! Routing keys on the bus equal the event type tags defined here.

pub mod wire;

pub use wire::{BidPlaced, DecodeError, UserCreated, from_timestamp, to_timestamp};

/// Event type (and routing key) for accepted bids.
pub const BID_PLACED: &str = "bid.placed";

/// Event type (and routing key) for user registrations, produced by the
/// identity service.
pub const USER_CREATED: &str = "user.created";

/// Name of the topic exchange all auction events flow through.
pub const EXCHANGE: &str = "auction.events";
