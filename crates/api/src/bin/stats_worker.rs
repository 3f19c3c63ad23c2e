//! Stats worker: the idempotent consumer materializing user statistics
//! from the bid stream.

use analytics::{BidEventConsumer, PostgresStatsStore};
use api::Config;
use events::EXCHANGE;
use messaging::KafkaBus;
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

    let store = PostgresStatsStore::new(session);
    store
        .run_migrations()
        .await
        .expect("failed to run migrations");

    let bus = KafkaBus::new(&config.broker_url, EXCHANGE).expect("failed to connect to broker");
    let consumer = BidEventConsumer::new(store, config.consumer_queue_name.clone());

    if let Err(e) = consumer.run(&bus, api::signals::shutdown_channel()).await {
        tracing::error!(error = %e, "stats consumer stopped on broker error");
        std::process::exit(1);
    }
    tracing::info!("stats worker shut down gracefully");
}
