//! PostgreSQL session shared by the service stores.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use crate::{Result, StoreError};

/// A PostgreSQL transaction bound to one pooled connection.
pub type PgTx = Transaction<'static, Postgres>;

/// Connection pool plus the per-transaction lock acquisition timeout.
///
/// Each service's Postgres store embeds a session and delegates its
/// [`TxManager`](crate::TxManager) implementation to it, so every
/// transaction in the system starts with the same `lock_timeout` applied.
#[derive(Clone)]
pub struct PgSession {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgSession {
    /// Wraps an existing pool.
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Connects a new pool to `url`.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool, lock_timeout))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Starts a transaction with the configured lock timeout installed.
    pub async fn begin(&self) -> Result<PgTx> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let timeout_ms = self.lock_timeout.as_millis();
        if timeout_ms > 0 {
            // SET LOCAL scopes the timeout to this transaction only.
            sqlx::query(&format!("SET LOCAL lock_timeout = '{timeout_ms}ms'"))
                .execute(&mut *tx)
                .await?;
        }

        Ok(tx)
    }

    pub async fn commit(&self, tx: PgTx) -> Result<()> {
        tx.commit()
            .await
            .map_err(|e| StoreError::TransactionFailed(e.to_string()))
    }

    pub async fn rollback(&self, tx: PgTx) -> Result<()> {
        tx.rollback().await.map_err(StoreError::Database)
    }
}

/// Maps row-level query failures onto the typed store errors.
///
/// SQLSTATE 55P03 (`lock_not_available`) is what Postgres raises when the
/// transaction's `lock_timeout` fires while waiting on a row lock.
pub fn map_row_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("55P03") => {
            StoreError::LockTimeout
        }
        _ => StoreError::Database(e),
    }
}
