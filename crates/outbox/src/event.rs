use chrono::{DateTime, Utc};
use common::EventId;

/// Lifecycle states of an outbox row.
///
/// Rows are created Pending together with their business mutation, stamped
/// Processing by the relay transaction that claims them, and Published once
/// the broker acknowledges. Failed is reserved for future dead-letter
/// handling; the relay never writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Processing,
    Published,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Processing => "processing",
            OutboxStatus::Published => "published",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OutboxStatus::Pending),
            "processing" => Some(OutboxStatus::Processing),
            "published" => Some(OutboxStatus::Published),
            "failed" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states carry a `processed_at` stamp.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutboxStatus::Published | OutboxStatus::Failed)
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable record of a business event awaiting publication.
///
/// The payload is the opaque wire encoding of the event body; the relay
/// never looks inside it, it only routes by `event_type`.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: EventId,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Creates a Pending event ready to be saved alongside its business
    /// mutation.
    pub fn pending(
        event_type: impl Into<String>,
        payload: Vec<u8>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            payload,
            status: OutboxStatus::Pending,
            created_at,
            processed_at: None,
        }
    }
}
