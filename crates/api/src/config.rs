//! Service configuration loaded from environment variables.

use std::time::Duration;

/// Runtime configuration shared by the API server and the workers.
///
/// Reads from environment variables:
/// - `STORE_URL` — PostgreSQL connection string (no default; binaries fail
///   fast without it)
/// - `BROKER_URL` — broker bootstrap address (default: `"localhost:9092"`)
/// - `LOCK_TIMEOUT_MS` — per-transaction lock acquisition timeout
///   (default: `3000`)
/// - `OUTBOX_BATCH_SIZE` — events claimed per relay tick (default: `10`)
/// - `OUTBOX_POLL_INTERVAL_MS` — relay poll interval (default: `500`)
/// - `CONSUMER_QUEUE_NAME` — queue the stats consumer binds
///   (default: `"user_stats_bids"`)
/// - `HOST` / `PORT` — API bind address (default: `0.0.0.0:3000`)
/// - `DB_MAX_CONNECTIONS` — pool size (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub store_url: Option<String>,
    pub broker_url: String,
    pub lock_timeout: Duration,
    pub outbox_batch_size: u32,
    pub outbox_poll_interval: Duration,
    pub consumer_queue_name: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            store_url: std::env::var("STORE_URL").ok(),
            broker_url: std::env::var("BROKER_URL")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            lock_timeout: Duration::from_millis(env_parse("LOCK_TIMEOUT_MS", 3_000)),
            outbox_batch_size: env_parse("OUTBOX_BATCH_SIZE", 10),
            outbox_poll_interval: Duration::from_millis(env_parse(
                "OUTBOX_POLL_INTERVAL_MS",
                500,
            )),
            consumer_queue_name: std::env::var("CONSUMER_QUEUE_NAME")
                .unwrap_or_else(|_| "user_stats_bids".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The store URL, or an explanation of how to set it.
    pub fn require_store_url(&self) -> &str {
        self.store_url
            .as_deref()
            .expect("STORE_URL must be set (postgres://...)")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_url: None,
            broker_url: "localhost:9092".to_string(),
            lock_timeout: Duration::from_secs(3),
            outbox_batch_size: 10,
            outbox_poll_interval: Duration::from_millis(500),
            consumer_queue_name: "user_stats_bids".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            db_max_connections: 10,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
