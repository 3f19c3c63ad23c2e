//! Bus publisher/subscriber contracts and broker adapters.
//!
//! The deployment runs one durable topic exchange (`auction.events`);
//! routing keys equal event types (`bid.placed`, `user.created`) and
//! binding patterns use `*` (exactly one word) and `#` (zero or more
//! words). Two adapters implement the contracts: [`InMemoryBroker`] with
//! full topic-exchange semantics in-process, and [`KafkaBus`] over rdkafka.
//!
//! Delivery is at-least-once everywhere: a delivery not acked before its
//! subscriber disconnects is redelivered, and consumers must deduplicate.

pub mod kafka;
pub mod memory;
mod pattern;

pub use kafka::KafkaBus;
pub use memory::InMemoryBroker;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by broker adapters.
///
/// Every publish and subscribe failure path maps onto one of these
/// variants; nothing escapes as an untyped infrastructure error.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker cannot be reached.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// A publish was not acknowledged.
    #[error("publish of {routing_key} failed: {reason}")]
    PublishFailed {
        routing_key: String,
        reason: String,
    },

    /// A subscription could not be established.
    #[error("subscribe on queue {queue} failed: {reason}")]
    SubscribeFailed { queue: String, reason: String },
}

/// Publishing half of the bus contract.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `payload` to `exchange` under `routing_key`, returning
    /// only after the broker acknowledges it.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError>;
}

/// Subscribing half of the bus contract.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Binds the durable queue `queue` to `binding_pattern` (declared
    /// idempotently) and starts consuming from it.
    async fn subscribe(
        &self,
        queue: &str,
        binding_pattern: &str,
    ) -> Result<Subscription, BrokerError>;
}

/// A single message handed to a subscriber.
///
/// The delivery must be completed with [`ack`](Delivery::ack) or
/// [`nack`](Delivery::nack); deliveries left incomplete when the
/// subscription drops are requeued for another subscriber.
pub struct Delivery {
    pub delivery_tag: u64,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub(crate) acker: Acker,
}

impl Delivery {
    /// Acknowledges the delivery; the broker forgets it.
    pub async fn ack(self) -> Result<(), BrokerError> {
        match self.acker {
            Acker::Memory(acker) => acker.ack(self.delivery_tag),
            Acker::Kafka(acker) => acker.ack(self.delivery_tag),
        }
    }

    /// Rejects the delivery. With `requeue` the broker redelivers it
    /// (after the message returns to the front of the queue); without,
    /// the message is dropped as poison.
    pub async fn nack(self, requeue: bool) -> Result<(), BrokerError> {
        match self.acker {
            Acker::Memory(acker) => acker.nack(self.delivery_tag, requeue),
            Acker::Kafka(acker) => acker.nack(self.delivery_tag, requeue),
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("routing_key", &self.routing_key)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

pub(crate) enum Acker {
    Memory(memory::MemoryAcker),
    Kafka(kafka::KafkaAcker),
}

/// An open consumer on a queue.
pub struct Subscription(pub(crate) SubscriptionInner);

pub(crate) enum SubscriptionInner {
    Memory(memory::MemorySubscription),
    Kafka(kafka::KafkaSubscription),
}

impl Subscription {
    /// Receives the next delivery. Returns `None` once the subscription
    /// is closed by the broker.
    pub async fn recv(&mut self) -> Option<Delivery> {
        match &mut self.0 {
            SubscriptionInner::Memory(sub) => sub.recv().await,
            SubscriptionInner::Kafka(sub) => sub.recv().await,
        }
    }
}
