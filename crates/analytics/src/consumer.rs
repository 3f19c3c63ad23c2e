//! The idempotent `bid.placed` consumer.

use chrono::{DateTime, Utc};
use common::{EventId, UserId};
use events::{BID_PLACED, BidPlaced, DecodeError};
use messaging::{BrokerError, Delivery, Subscriber};
use tokio::sync::watch;

use crate::error::ConsumerError;
use crate::store::StatsStore;

/// Typed facts of a `bid.placed` delivery.
///
/// The payload carries no separate event id; the bid id is the
/// deduplication key, since exactly one event exists per bid.
#[derive(Debug, Clone, Copy)]
pub struct BidPlacedEvent {
    pub event_id: EventId,
    pub user_id: UserId,
    pub amount: i64,
    pub bid_at: DateTime<Utc>,
}

impl TryFrom<&BidPlaced> for BidPlacedEvent {
    type Error = DecodeError;

    fn try_from(wire: &BidPlaced) -> Result<Self, DecodeError> {
        let event_id = wire
            .bid_id
            .parse()
            .map_err(|e: uuid::Error| DecodeError::InvalidField {
                field: "bid_id",
                reason: e.to_string(),
            })?;
        let user_id = wire
            .user_id
            .parse()
            .map_err(|e: uuid::Error| DecodeError::InvalidField {
                field: "user_id",
                reason: e.to_string(),
            })?;
        Ok(Self {
            event_id,
            user_id,
            amount: wire.amount,
            bid_at: wire.timestamp_utc()?,
        })
    }
}

/// Consumes the bid stream and maintains [`UserStats`](crate::UserStats).
///
/// Tolerant of at-least-once redelivery: the dedup gate and the aggregate
/// upsert share one transaction, so a duplicate delivery is a committed
/// no-op followed by an ack.
pub struct BidEventConsumer<S: StatsStore> {
    store: S,
    queue: String,
}

impl<S: StatsStore> BidEventConsumer<S> {
    pub fn new(store: S, queue: impl Into<String>) -> Self {
        Self {
            store,
            queue: queue.into(),
        }
    }

    /// Subscribes to `bid.*` and processes deliveries one at a time until
    /// `shutdown` flips. An in-flight delivery is completed (or requeued
    /// by its nack) before the loop returns.
    #[tracing::instrument(skip_all, fields(queue = %self.queue))]
    pub async fn run<B: Subscriber>(
        &self,
        bus: &B,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), BrokerError> {
        let mut subscription = bus.subscribe(&self.queue, "bid.*").await?;
        tracing::info!("stats consumer started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("stats consumer shutting down");
                    return Ok(());
                }
                delivery = subscription.recv() => {
                    let Some(delivery) = delivery else {
                        return Err(BrokerError::Unavailable(
                            "subscription closed".to_string(),
                        ));
                    };
                    self.handle_delivery(delivery).await;
                }
            }
        }
    }

    /// Handles one delivery end to end, including its ack/nack.
    pub async fn handle_delivery(&self, delivery: Delivery) {
        if delivery.routing_key != BID_PLACED {
            // The binding pattern is wider than what this consumer
            // materializes; unknown types are acknowledged untouched.
            tracing::debug!(routing_key = %delivery.routing_key, "ignoring event type");
            if let Err(e) = delivery.ack().await {
                tracing::error!(error = %e, "failed to ack ignored delivery");
            }
            return;
        }

        let event = match BidPlaced::decode_payload(&delivery.payload)
            .and_then(|wire| BidPlacedEvent::try_from(&wire))
        {
            Ok(event) => event,
            Err(e) => {
                // Poison: no redelivery will ever make this parseable.
                metrics::counter!("analytics_events_poison").increment(1);
                tracing::error!(error = %e, "undecodable payload, dropping without requeue");
                if let Err(e) = delivery.nack(false).await {
                    tracing::error!(error = %e, "failed to nack poison delivery");
                }
                return;
            }
        };

        match self.process_bid_placed(event).await {
            Ok(applied) => {
                if applied {
                    metrics::counter!("analytics_events_processed").increment(1);
                } else {
                    metrics::counter!("analytics_events_duplicate").increment(1);
                    tracing::debug!(event_id = %event.event_id, "duplicate delivery ignored");
                }
                if let Err(e) = delivery.ack().await {
                    tracing::error!(event_id = %event.event_id, error = %e, "failed to ack");
                }
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.event_id,
                    error = %e,
                    "processing failed, requeueing"
                );
                if let Err(e) = delivery.nack(true).await {
                    tracing::error!(event_id = %event.event_id, error = %e, "failed to nack");
                }
            }
        }
    }

    /// Applies one event inside a single transaction. Returns `false` when
    /// the event had already been processed.
    #[tracing::instrument(skip(self), fields(event_id = %event.event_id))]
    pub async fn process_bid_placed(&self, event: BidPlacedEvent) -> Result<bool, ConsumerError> {
        let mut tx = self.store.begin().await?;

        if self.store.is_event_processed(&mut tx, event.event_id).await? {
            self.store.commit(tx).await?;
            return Ok(false);
        }

        self.store
            .apply_bid_placed(&mut tx, event.user_id, event.amount, event.bid_at)
            .await?;
        self.store
            .mark_event_processed(&mut tx, event.event_id)
            .await?;
        self.store.commit(tx).await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStatsStore;
    use crate::store::StatsStore;
    use chrono::Duration;

    fn consumer(store: &InMemoryStatsStore) -> BidEventConsumer<InMemoryStatsStore> {
        BidEventConsumer::new(store.clone(), "user_stats_bids")
    }

    fn event(user_id: UserId, amount: i64) -> BidPlacedEvent {
        BidPlacedEvent {
            event_id: EventId::new(),
            user_id,
            amount,
            bid_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn first_occurrence_inserts_the_aggregate() {
        let store = InMemoryStatsStore::new();
        let user = UserId::new();
        let e = event(user, 15_000);

        assert!(consumer(&store).process_bid_placed(e).await.unwrap());

        let stats = store.get_user_stats(user).await.unwrap().unwrap();
        assert_eq!(stats.total_bids_placed, 1);
        assert_eq!(stats.total_amount_bid, 15_000);
        assert_eq!(stats.last_bid_at, e.bid_at);
    }

    #[tokio::test]
    async fn conflict_accumulates() {
        let store = InMemoryStatsStore::new();
        let user = UserId::new();
        let c = consumer(&store);

        c.process_bid_placed(event(user, 10_000)).await.unwrap();
        c.process_bid_placed(event(user, 25_000)).await.unwrap();

        let stats = store.get_user_stats(user).await.unwrap().unwrap();
        assert_eq!(stats.total_bids_placed, 2);
        assert_eq!(stats.total_amount_bid, 35_000);
    }

    #[tokio::test]
    async fn redelivery_is_a_no_op() {
        let store = InMemoryStatsStore::new();
        let user = UserId::new();
        let e = event(user, 15_000);
        let c = consumer(&store);

        assert!(c.process_bid_placed(e).await.unwrap());
        assert!(!c.process_bid_placed(e).await.unwrap());
        assert!(!c.process_bid_placed(e).await.unwrap());

        let stats = store.get_user_stats(user).await.unwrap().unwrap();
        assert_eq!(stats.total_bids_placed, 1);
        assert_eq!(stats.total_amount_bid, 15_000);
        assert_eq!(store.processed_count(), 1);
    }

    #[tokio::test]
    async fn out_of_order_delivery_keeps_latest_bid_time() {
        let store = InMemoryStatsStore::new();
        let user = UserId::new();
        let c = consumer(&store);

        let later = Utc::now();
        let earlier = later - Duration::minutes(10);

        let mut newest = event(user, 20_000);
        newest.bid_at = later;
        let mut oldest = event(user, 10_000);
        oldest.bid_at = earlier;

        c.process_bid_placed(newest).await.unwrap();
        c.process_bid_placed(oldest).await.unwrap();

        let stats = store.get_user_stats(user).await.unwrap().unwrap();
        assert_eq!(stats.last_bid_at, later);
    }

    #[tokio::test]
    async fn store_failure_surfaces_for_requeue() {
        let store = InMemoryStatsStore::new();
        let user = UserId::new();
        let e = event(user, 15_000);
        let c = consumer(&store);

        store.fail_next_commit();
        assert!(c.process_bid_placed(e).await.is_err());

        // Nothing committed: the retry applies cleanly, exactly once.
        assert!(store.get_user_stats(user).await.unwrap().is_none());
        assert!(c.process_bid_placed(e).await.unwrap());
        let stats = store.get_user_stats(user).await.unwrap().unwrap();
        assert_eq!(stats.total_bids_placed, 1);
    }

    #[test]
    fn wire_conversion_rejects_bad_ids() {
        let wire = BidPlaced {
            bid_id: "not-a-uuid".to_string(),
            item_id: common::ItemId::new().to_string(),
            user_id: UserId::new().to_string(),
            amount: 1,
            timestamp: Some(events::to_timestamp(Utc::now())),
        };
        assert!(BidPlacedEvent::try_from(&wire).is_err());
    }

    #[test]
    fn wire_conversion_requires_timestamp() {
        let wire = BidPlaced {
            bid_id: EventId::new().to_string(),
            item_id: common::ItemId::new().to_string(),
            user_id: UserId::new().to_string(),
            amount: 1,
            timestamp: None,
        };
        assert!(matches!(
            BidPlacedEvent::try_from(&wire),
            Err(DecodeError::MissingField("timestamp"))
        ));
    }
}
