//! Protobuf message definitions and payload codecs.

use chrono::{DateTime, TimeZone, Utc};
use prost::Message;
use prost_types::Timestamp;
use thiserror::Error;

/// Errors raised while decoding a payload into an event.
///
/// A `DecodeError` marks the message as poison: the consumer drops it with
/// a non-requeuing nack, because no number of redeliveries will make it
/// parseable.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not a valid encoding of the expected message.
    #[error("malformed payload: {0}")]
    Malformed(#[from] prost::DecodeError),

    /// A required field is absent from the decoded message.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field carries a value outside its domain.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// Emitted when a bid is accepted on an item. Routed as `bid.placed`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BidPlaced {
    #[prost(string, tag = "1")]
    pub bid_id: String,
    #[prost(string, tag = "2")]
    pub item_id: String,
    #[prost(string, tag = "3")]
    pub user_id: String,
    /// Bid amount in minor currency units.
    #[prost(int64, tag = "4")]
    pub amount: i64,
    #[prost(message, optional, tag = "5")]
    pub timestamp: Option<Timestamp>,
}

/// Emitted when the identity service registers a user. Routed as
/// `user.created`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct UserCreated {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub email: String,
    #[prost(string, tag = "3")]
    pub full_name: String,
    /// Two-letter ISO country code.
    #[prost(string, tag = "4")]
    pub country_code: String,
    #[prost(message, optional, tag = "5")]
    pub created_at: Option<Timestamp>,
}

impl BidPlaced {
    /// Encodes the event into its wire payload.
    pub fn encode_payload(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Decodes a wire payload into the event.
    pub fn decode_payload(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::decode(bytes)?)
    }

    /// Returns the event timestamp as an absolute instant.
    pub fn timestamp_utc(&self) -> Result<DateTime<Utc>, DecodeError> {
        let ts = self
            .timestamp
            .as_ref()
            .ok_or(DecodeError::MissingField("timestamp"))?;
        from_timestamp(ts).ok_or_else(|| DecodeError::InvalidField {
            field: "timestamp",
            reason: format!("out of range: {}s {}ns", ts.seconds, ts.nanos),
        })
    }
}

impl UserCreated {
    pub fn encode_payload(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::decode(bytes)?)
    }
}

/// Converts an instant into its wire representation.
pub fn to_timestamp(at: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

/// Converts a wire timestamp back into an instant. Returns `None` for
/// out-of-range values.
pub fn from_timestamp(ts: &Timestamp) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts.seconds, ts.nanos.try_into().ok()?).single()
}
