//! In-process broker with topic-exchange semantics.
//!
//! Used by tests and local runs. Semantics mirror the production topology:
//! pattern bindings, one copy per bound queue, competing consumers on a
//! queue, ack/nack with requeue, and redelivery of unacked messages when a
//! subscriber disconnects.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::pattern::topic_matches;
use crate::{
    Acker, BrokerError, Delivery, Publisher, Subscriber, Subscription, SubscriptionInner,
};

/// A single-exchange topic broker held entirely in memory.
///
/// Cloning is cheap and shares the underlying state, the way a pool handle
/// would.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<SharedState>,
}

#[derive(Default)]
struct SharedState {
    exchange: Mutex<ExchangeState>,
}

#[derive(Default)]
struct ExchangeState {
    bindings: Vec<Binding>,
    queues: HashMap<String, Queue>,
    next_tag: u64,
    next_subscriber: u64,
}

struct Binding {
    queue: String,
    pattern: String,
}

struct Queue {
    ready: VecDeque<QueuedMessage>,
    unacked: HashMap<u64, InFlight>,
    notify: Arc<Notify>,
}

impl Queue {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            unacked: HashMap::new(),
            notify: Arc::new(Notify::new()),
        }
    }
}

#[derive(Clone)]
struct QueuedMessage {
    routing_key: String,
    payload: Vec<u8>,
}

struct InFlight {
    subscriber: u64,
    message: QueuedMessage,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting in `queue` (not counting in-flight ones).
    pub fn pending(&self, queue: &str) -> usize {
        let ex = self.state.exchange.lock().unwrap();
        ex.queues.get(queue).map(|q| q.ready.len()).unwrap_or(0)
    }

    /// Number of delivered-but-unacked messages on `queue`.
    pub fn in_flight(&self, queue: &str) -> usize {
        let ex = self.state.exchange.lock().unwrap();
        ex.queues.get(queue).map(|q| q.unacked.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn publish(
        &self,
        _exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        let mut ex = self.state.exchange.lock().unwrap();

        // One copy per bound queue, even if several bindings match.
        let targets: HashSet<String> = ex
            .bindings
            .iter()
            .filter(|b| topic_matches(&b.pattern, routing_key))
            .map(|b| b.queue.clone())
            .collect();

        if targets.is_empty() {
            tracing::debug!(routing_key, "no binding matched; message dropped");
            return Ok(());
        }

        for name in targets {
            if let Some(queue) = ex.queues.get_mut(&name) {
                queue.ready.push_back(QueuedMessage {
                    routing_key: routing_key.to_string(),
                    payload: payload.to_vec(),
                });
                queue.notify.notify_one();
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Subscriber for InMemoryBroker {
    async fn subscribe(
        &self,
        queue: &str,
        binding_pattern: &str,
    ) -> Result<Subscription, BrokerError> {
        let mut ex = self.state.exchange.lock().unwrap();

        ex.queues.entry(queue.to_string()).or_insert_with(Queue::new);

        // Binding declaration is idempotent.
        let exists = ex
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.pattern == binding_pattern);
        if !exists {
            ex.bindings.push(Binding {
                queue: queue.to_string(),
                pattern: binding_pattern.to_string(),
            });
        }

        ex.next_subscriber += 1;
        let id = ex.next_subscriber;

        Ok(Subscription(SubscriptionInner::Memory(MemorySubscription {
            state: Arc::clone(&self.state),
            queue: queue.to_string(),
            id,
        })))
    }
}

pub(crate) struct MemorySubscription {
    state: Arc<SharedState>,
    queue: String,
    id: u64,
}

impl MemorySubscription {
    pub(crate) async fn recv(&mut self) -> Option<Delivery> {
        loop {
            let notify = {
                let mut ex = self.state.exchange.lock().unwrap();
                ex.next_tag += 1;
                let tag = ex.next_tag;

                let queue = ex.queues.get_mut(&self.queue)?;
                if let Some(message) = queue.ready.pop_front() {
                    if !queue.ready.is_empty() {
                        // Wake the next competing consumer.
                        queue.notify.notify_one();
                    }
                    queue.unacked.insert(
                        tag,
                        InFlight {
                            subscriber: self.id,
                            message: message.clone(),
                        },
                    );
                    return Some(Delivery {
                        delivery_tag: tag,
                        routing_key: message.routing_key,
                        payload: message.payload,
                        acker: Acker::Memory(MemoryAcker {
                            state: Arc::clone(&self.state),
                            queue: self.queue.clone(),
                        }),
                    });
                }
                queue.notify.clone()
            };
            notify.notified().await;
        }
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        // A disconnecting subscriber returns its unacked deliveries to the
        // queue so another subscriber picks them up.
        let mut ex = self.state.exchange.lock().unwrap();
        if let Some(queue) = ex.queues.get_mut(&self.queue) {
            let mut tags: Vec<u64> = queue
                .unacked
                .iter()
                .filter(|(_, f)| f.subscriber == self.id)
                .map(|(tag, _)| *tag)
                .collect();
            tags.sort_unstable();
            for tag in tags.into_iter().rev() {
                if let Some(inflight) = queue.unacked.remove(&tag) {
                    queue.ready.push_front(inflight.message);
                }
            }
            if !queue.ready.is_empty() {
                queue.notify.notify_one();
            }
        }
    }
}

pub(crate) struct MemoryAcker {
    state: Arc<SharedState>,
    queue: String,
}

impl MemoryAcker {
    pub(crate) fn ack(self, tag: u64) -> Result<(), BrokerError> {
        let mut ex = self.state.exchange.lock().unwrap();
        if let Some(queue) = ex.queues.get_mut(&self.queue) {
            queue.unacked.remove(&tag);
        }
        Ok(())
    }

    pub(crate) fn nack(self, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let mut ex = self.state.exchange.lock().unwrap();
        if let Some(queue) = ex.queues.get_mut(&self.queue)
            && let Some(inflight) = queue.unacked.remove(&tag)
        {
            if requeue {
                queue.ready.push_front(inflight.message);
                queue.notify.notify_one();
            } else {
                tracing::debug!(tag, queue = %self.queue, "message dropped without requeue");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXCHANGE: &str = "auction.events";

    async fn subscribe(broker: &InMemoryBroker, queue: &str, pattern: &str) -> Subscription {
        broker.subscribe(queue, pattern).await.unwrap()
    }

    #[tokio::test]
    async fn routes_by_binding_pattern() {
        let broker = InMemoryBroker::new();
        let mut bids = subscribe(&broker, "bids", "bid.*").await;
        let _users = subscribe(&broker, "users", "user.*").await;

        broker.publish(EXCHANGE, "bid.placed", b"a").await.unwrap();
        broker.publish(EXCHANGE, "user.created", b"b").await.unwrap();

        let delivery = bids.recv().await.unwrap();
        assert_eq!(delivery.routing_key, "bid.placed");
        assert_eq!(delivery.payload, b"a");
        assert_eq!(broker.pending("bids"), 0);
        assert_eq!(broker.pending("users"), 1);
        delivery.ack().await.unwrap();
    }

    #[tokio::test]
    async fn unmatched_key_is_dropped() {
        let broker = InMemoryBroker::new();
        let _bids = subscribe(&broker, "bids", "bid.*").await;

        broker.publish(EXCHANGE, "item.ended", b"x").await.unwrap();
        assert_eq!(broker.pending("bids"), 0);
    }

    #[tokio::test]
    async fn each_bound_queue_gets_one_copy() {
        let broker = InMemoryBroker::new();
        let mut q1 = subscribe(&broker, "stats", "bid.*").await;
        let mut q2 = subscribe(&broker, "audit", "#").await;

        broker.publish(EXCHANGE, "bid.placed", b"a").await.unwrap();

        assert_eq!(q1.recv().await.unwrap().payload, b"a");
        assert_eq!(q2.recv().await.unwrap().payload, b"a");
    }

    #[tokio::test]
    async fn ack_completes_the_delivery() {
        let broker = InMemoryBroker::new();
        let mut sub = subscribe(&broker, "bids", "bid.*").await;

        broker.publish(EXCHANGE, "bid.placed", b"a").await.unwrap();
        let delivery = sub.recv().await.unwrap();
        assert_eq!(broker.in_flight("bids"), 1);

        delivery.ack().await.unwrap();
        assert_eq!(broker.in_flight("bids"), 0);
        assert_eq!(broker.pending("bids"), 0);
    }

    #[tokio::test]
    async fn nack_with_requeue_redelivers() {
        let broker = InMemoryBroker::new();
        let mut sub = subscribe(&broker, "bids", "bid.*").await;

        broker.publish(EXCHANGE, "bid.placed", b"a").await.unwrap();
        let first = sub.recv().await.unwrap();
        let first_tag = first.delivery_tag;
        first.nack(true).await.unwrap();

        let second = sub.recv().await.unwrap();
        assert_eq!(second.payload, b"a");
        assert_ne!(second.delivery_tag, first_tag);
        second.ack().await.unwrap();
    }

    #[tokio::test]
    async fn nack_without_requeue_drops_poison() {
        let broker = InMemoryBroker::new();
        let mut sub = subscribe(&broker, "bids", "bid.*").await;

        broker.publish(EXCHANGE, "bid.placed", b"bad").await.unwrap();
        sub.recv().await.unwrap().nack(false).await.unwrap();

        assert_eq!(broker.pending("bids"), 0);
        assert_eq!(broker.in_flight("bids"), 0);
    }

    #[tokio::test]
    async fn disconnect_requeues_unacked() {
        let broker = InMemoryBroker::new();
        let mut sub = subscribe(&broker, "bids", "bid.*").await;

        broker.publish(EXCHANGE, "bid.placed", b"a").await.unwrap();
        broker.publish(EXCHANGE, "bid.placed", b"b").await.unwrap();

        let _held = sub.recv().await.unwrap();
        drop(sub);

        // Both messages must be available to the next subscriber, in order.
        let mut sub2 = subscribe(&broker, "bids", "bid.*").await;
        assert_eq!(sub2.recv().await.unwrap().payload, b"a");
        assert_eq!(sub2.recv().await.unwrap().payload, b"b");
    }

    #[tokio::test]
    async fn competing_consumers_share_the_queue() {
        let broker = InMemoryBroker::new();
        let mut sub1 = subscribe(&broker, "bids", "bid.*").await;
        let mut sub2 = subscribe(&broker, "bids", "bid.*").await;

        broker.publish(EXCHANGE, "bid.placed", b"a").await.unwrap();
        broker.publish(EXCHANGE, "bid.placed", b"b").await.unwrap();

        let d1 = sub1.recv().await.unwrap();
        let d2 = sub2.recv().await.unwrap();
        let mut payloads = vec![d1.payload.clone(), d2.payload.clone()];
        payloads.sort();
        assert_eq!(payloads, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
