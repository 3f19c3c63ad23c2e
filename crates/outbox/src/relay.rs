//! The relay: a poll → publish → mark loop draining the outbox.

use std::time::Duration;

use messaging::{BrokerError, Publisher};
use storage::StoreError;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::{OutboxStatus, store::OutboxStore};

/// Relay tuning knobs. `exchange` is fixed per deployment.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub batch_size: u32,
    pub poll_interval: Duration,
    pub exchange: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_millis(500),
            exchange: "auction.events".to_string(),
        }
    }
}

/// Errors raised by a single relay tick. Both kinds are infrastructure
/// failures: the loop logs them and retries on the next tick.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Moves events from the outbox to the bus, at-least-once.
///
/// Multiple relay instances may run against the same outbox: the
/// lock-skipping claim hands each a disjoint batch, so they scale
/// horizontally without coordination or leader election.
pub struct OutboxRelay<S, P> {
    store: S,
    publisher: P,
    config: RelayConfig,
}

impl<S: OutboxStore, P: Publisher> OutboxRelay<S, P> {
    pub fn new(store: S, publisher: P, config: RelayConfig) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Runs the polling loop until `shutdown` flips to true (or its sender
    /// drops). An in-flight tick always completes first; its non-commit
    /// exits roll back, so cancellation never leaves a transaction open.
    #[tracing::instrument(skip_all, fields(exchange = %self.config.exchange))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "outbox relay started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("outbox relay shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    match self.process_batch().await {
                        Ok(0) => {}
                        Ok(published) => {
                            tracing::debug!(published, "relay tick complete");
                        }
                        Err(e) => {
                            metrics::counter!("outbox_relay_errors").increment(1);
                            tracing::error!(error = %e, "relay tick failed; will retry");
                        }
                    }
                }
            }
        }
    }

    /// One tick: claim a batch, publish each event, mark it Published,
    /// commit. Returns the number of events published.
    ///
    /// A publish failure returns early; the dropped transaction reverts
    /// the whole batch to Pending for the next tick. A commit failure
    /// after successful publishes also reverts the batch — those events
    /// will be published again, which is why consumers deduplicate.
    pub async fn process_batch(&self) -> Result<usize, RelayError> {
        let mut tx = self.store.begin().await?;

        let events = self
            .store
            .claim_pending(&mut tx, self.config.batch_size)
            .await?;
        if events.is_empty() {
            self.store.rollback(tx).await?;
            return Ok(0);
        }

        tracing::debug!(count = events.len(), "claimed pending events");

        for event in &events {
            self.publisher
                .publish(&self.config.exchange, &event.event_type, &event.payload)
                .await
                .map_err(|e| {
                    tracing::warn!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        error = %e,
                        "publish failed; batch rolls back to pending"
                    );
                    e
                })?;

            self.store
                .mark_status(&mut tx, event.id, OutboxStatus::Published)
                .await?;
        }

        let published = events.len();
        self.store.commit(tx).await?;
        metrics::counter!("outbox_events_published").increment(published as u64);
        Ok(published)
    }
}
