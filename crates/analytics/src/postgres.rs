//! PostgreSQL stats store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventId, UserId};
use sqlx::Row;
use sqlx::postgres::PgRow;
use storage::{PgSession, PgTx, Result, TxManager};
use uuid::Uuid;

use crate::model::UserStats;
use crate::store::StatsStore;

/// Stats store over PostgreSQL.
#[derive(Clone)]
pub struct PostgresStatsStore {
    session: PgSession,
}

impl PostgresStatsStore {
    pub fn new(session: PgSession) -> Self {
        Self { session }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations")
            .run(self.session.pool())
            .await
    }
}

#[async_trait]
impl TxManager for PostgresStatsStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        self.session.begin().await
    }

    async fn commit(&self, tx: PgTx) -> Result<()> {
        self.session.commit(tx).await
    }

    async fn rollback(&self, tx: PgTx) -> Result<()> {
        self.session.rollback(tx).await
    }
}

#[async_trait]
impl StatsStore for PostgresStatsStore {
    async fn is_event_processed(&self, tx: &mut PgTx, event_id: EventId) -> Result<bool> {
        let row: Option<i32> = sqlx::query_scalar("SELECT 1 FROM processed_events WHERE event_id = $1")
            .bind(event_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.is_some())
    }

    async fn mark_event_processed(&self, tx: &mut PgTx, event_id: EventId) -> Result<()> {
        sqlx::query("INSERT INTO processed_events (event_id, processed_at) VALUES ($1, NOW())")
            .bind(event_id.as_uuid())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn apply_bid_placed(
        &self,
        tx: &mut PgTx,
        user_id: UserId,
        amount: i64,
        bid_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_stats
                (user_id, total_bids_placed, total_amount_bid, last_bid_at, created_at, updated_at)
            VALUES ($1, 1, $2, $3, NOW(), NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                total_bids_placed = user_stats.total_bids_placed + 1,
                total_amount_bid = user_stats.total_amount_bid + EXCLUDED.total_amount_bid,
                last_bid_at = GREATEST(user_stats.last_bid_at, EXCLUDED.last_bid_at),
                updated_at = NOW()
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(amount)
        .bind(bid_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn get_user_stats(&self, user_id: UserId) -> Result<Option<UserStats>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, total_bids_placed, total_amount_bid, last_bid_at, created_at, updated_at
            FROM user_stats
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(self.session.pool())
        .await?;
        row.map(row_to_stats).transpose()
    }
}

fn row_to_stats(row: PgRow) -> Result<UserStats> {
    Ok(UserStats {
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        total_bids_placed: row.try_get("total_bids_placed")?,
        total_amount_bid: row.try_get("total_amount_bid")?,
        last_bid_at: row.try_get("last_bid_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
