//! Kafka-backed bus adapter.
//!
//! The topic-exchange contract maps onto Kafka as follows: a publish to
//! exchange `E` with routing key `K` lands on topic `E.K`; a binding
//! pattern becomes a regex topic subscription; the queue name becomes the
//! consumer group, so replicas of one service share the workload. Offsets
//! are committed manually on ack — at-least-once, duplicates possible.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::mpsc;

use crate::{
    Acker, BrokerError, Delivery, Publisher, Subscriber, Subscription, SubscriptionInner,
};

/// Bus adapter over a Kafka-compatible cluster.
pub struct KafkaBus {
    producer: FutureProducer,
    brokers: String,
    exchange: String,
    timeout: Duration,
}

impl KafkaBus {
    /// Connects a producer to `brokers` for the given exchange.
    pub fn new(brokers: &str, exchange: &str) -> Result<Self, BrokerError> {
        Self::builder().brokers(brokers).exchange(exchange).build()
    }

    #[must_use]
    pub fn builder() -> KafkaBusBuilder {
        KafkaBusBuilder::default()
    }
}

/// Builder for configuring a [`KafkaBus`].
#[derive(Default)]
pub struct KafkaBusBuilder {
    brokers: Option<String>,
    exchange: Option<String>,
    producer_acks: Option<String>,
    timeout: Option<Duration>,
}

impl KafkaBusBuilder {
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    #[must_use]
    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Producer acknowledgment mode: "0", "1" or "all". Default: "all".
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Producer send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<KafkaBus, BrokerError> {
        let brokers = self
            .brokers
            .ok_or_else(|| BrokerError::Unavailable("brokers not configured".to_string()))?;
        let exchange = self
            .exchange
            .ok_or_else(|| BrokerError::Unavailable("exchange not configured".to_string()))?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("all"))
            .create()
            .map_err(|e| BrokerError::Unavailable(format!("failed to create producer: {e}")))?;

        tracing::info!(%brokers, %exchange, "kafka bus connected");

        Ok(KafkaBus {
            producer,
            brokers,
            exchange,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
        })
    }
}

#[async_trait]
impl Publisher for KafkaBus {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        let topic = format!("{exchange}.{routing_key}");
        let record = FutureRecord::to(&topic).payload(payload).key(routing_key);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                tracing::debug!(%topic, partition, offset, "published");
                Ok(())
            }
            Err((e, _)) => Err(BrokerError::PublishFailed {
                routing_key: routing_key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Subscriber for KafkaBus {
    async fn subscribe(
        &self,
        queue: &str,
        binding_pattern: &str,
    ) -> Result<Subscription, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", queue)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .set("allow.auto.create.topics", "true")
            .create()
            .map_err(|e| BrokerError::SubscribeFailed {
                queue: queue.to_string(),
                reason: format!("failed to create consumer: {e}"),
            })?;

        let topic_regex = topic_regex(&self.exchange, binding_pattern);
        consumer
            .subscribe(&[&topic_regex])
            .map_err(|e| BrokerError::SubscribeFailed {
                queue: queue.to_string(),
                reason: format!("failed to subscribe to {topic_regex}: {e}"),
            })?;

        tracing::info!(queue, %topic_regex, "subscribed");

        let (delivery_tx, delivery_rx) = mpsc::channel::<Delivery>(16);
        let (ack_tx, ack_rx) = mpsc::unbounded_channel::<AckCommand>();

        tokio::spawn(consume_loop(consumer, delivery_tx, ack_tx, ack_rx));

        Ok(Subscription(SubscriptionInner::Kafka(KafkaSubscription {
            rx: delivery_rx,
        })))
    }
}

enum AckCommand {
    Ack(u64),
    Nack { tag: u64, requeue: bool },
}

/// Owns the consumer: forwards messages to the subscription and applies
/// ack commands against offsets. One task per subscription, so the
/// consumer handle is never shared across workers.
async fn consume_loop(
    consumer: StreamConsumer,
    delivery_tx: mpsc::Sender<Delivery>,
    ack_tx: mpsc::UnboundedSender<AckCommand>,
    mut ack_rx: mpsc::UnboundedReceiver<AckCommand>,
) {
    let mut offsets: HashMap<u64, (String, i32, i64)> = HashMap::new();
    let mut next_tag: u64 = 0;
    let mut stream = consumer.stream();

    loop {
        tokio::select! {
            Some(cmd) = ack_rx.recv() => match cmd {
                AckCommand::Ack(tag) | AckCommand::Nack { tag, requeue: false } => {
                    if let Some((topic, partition, offset)) = offsets.remove(&tag) {
                        let mut tpl = TopicPartitionList::new();
                        if tpl
                            .add_partition_offset(&topic, partition, Offset::Offset(offset + 1))
                            .is_ok()
                            && let Err(e) = consumer.commit(&tpl, CommitMode::Async)
                        {
                            tracing::warn!(%topic, partition, offset, error = %e, "offset commit failed");
                        }
                    }
                }
                AckCommand::Nack { tag, requeue: true } => {
                    if let Some((topic, partition, offset)) = offsets.remove(&tag)
                        && let Err(e) = consumer.seek(
                            &topic,
                            partition,
                            Offset::Offset(offset),
                            Timeout::After(Duration::from_secs(5)),
                        )
                    {
                        tracing::warn!(%topic, partition, offset, error = %e, "seek for requeue failed");
                    }
                }
            },
            message = stream.next() => {
                let Some(message) = message else { break };
                match message {
                    Ok(m) => {
                        let routing_key = m
                            .key()
                            .and_then(|k| std::str::from_utf8(k).ok())
                            .map(str::to_string)
                            .unwrap_or_else(|| m.topic().to_string());
                        next_tag += 1;
                        offsets.insert(next_tag, (m.topic().to_string(), m.partition(), m.offset()));
                        let delivery = Delivery {
                            delivery_tag: next_tag,
                            routing_key,
                            payload: m.payload().unwrap_or_default().to_vec(),
                            acker: Acker::Kafka(KafkaAcker { tx: ack_tx.clone() }),
                        };
                        if delivery_tx.send(delivery).await.is_err() {
                            // Subscription dropped; uncommitted offsets are
                            // redelivered to the group on rebalance.
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "consumer receive error");
                    }
                }
            }
        }
    }

    tracing::debug!("consumer task exiting");
}

pub(crate) struct KafkaSubscription {
    rx: mpsc::Receiver<Delivery>,
}

impl KafkaSubscription {
    pub(crate) async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

pub(crate) struct KafkaAcker {
    tx: mpsc::UnboundedSender<AckCommand>,
}

impl KafkaAcker {
    pub(crate) fn ack(self, tag: u64) -> Result<(), BrokerError> {
        self.tx
            .send(AckCommand::Ack(tag))
            .map_err(|_| BrokerError::Unavailable("consumer task gone".to_string()))
    }

    pub(crate) fn nack(self, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.tx
            .send(AckCommand::Nack { tag, requeue })
            .map_err(|_| BrokerError::Unavailable("consumer task gone".to_string()))
    }
}

/// Translates a binding pattern into a regex topic subscription.
///
/// `*` matches one word, `#` matches the rest of the key (a trailing `#`
/// also matches zero words, which is the only placement the deployment
/// uses).
fn topic_regex(exchange: &str, pattern: &str) -> String {
    let mut out = String::from("^");
    push_escaped(&mut out, exchange);
    for segment in pattern.split('.') {
        match segment {
            "*" => out.push_str("\\.[^.]+"),
            "#" => out.push_str("(\\..+)?"),
            word => {
                out.push_str("\\.");
                push_escaped(&mut out, word);
            }
        }
    }
    out.push('$');
    out
}

fn push_escaped(out: &mut String, word: &str) {
    for c in word.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::topic_regex;

    #[test]
    fn exact_key_regex() {
        assert_eq!(
            topic_regex("auction.events", "bid.placed"),
            r"^auction\.events\.bid\.placed$"
        );
    }

    #[test]
    fn star_becomes_single_word() {
        assert_eq!(
            topic_regex("auction.events", "bid.*"),
            r"^auction\.events\.bid\.[^.]+$"
        );
    }

    #[test]
    fn trailing_hash_matches_zero_or_more() {
        assert_eq!(
            topic_regex("auction.events", "bid.#"),
            r"^auction\.events\.bid(\..+)?$"
        );
    }

    #[test]
    fn bus_builder_requires_brokers() {
        assert!(super::KafkaBus::builder().exchange("auction.events").build().is_err());
    }
}
