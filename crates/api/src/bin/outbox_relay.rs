//! Outbox relay worker: drains Pending events onto the bus.
//!
//! Horizontally scalable; each instance claims a disjoint batch.

use api::Config;
use events::EXCHANGE;
use messaging::KafkaBus;
use outbox::{OutboxRelay, PostgresOutboxStore, RelayConfig};
use storage::PgSession;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();
    let session = PgSession::connect(
        config.require_store_url(),
        config.db_max_connections,
        config.lock_timeout,
    )
    .await
    .expect("failed to connect to store");

    let bus = KafkaBus::new(&config.broker_url, EXCHANGE).expect("failed to connect to broker");

    let relay = OutboxRelay::new(
        PostgresOutboxStore::new(session),
        bus,
        RelayConfig {
            batch_size: config.outbox_batch_size,
            poll_interval: config.outbox_poll_interval,
            exchange: EXCHANGE.to_string(),
        },
    );

    relay.run(api::signals::shutdown_channel()).await;
    tracing::info!("relay worker shut down gracefully");
}
