//! PostgreSQL outbox store.
//!
//! The row-mapping helpers are free functions over a connection so that a
//! service store embedding its own [`PgSession`] (the bid store writes
//! outbox rows inside bid transactions) can reuse the same SQL.

use async_trait::async_trait;
use chrono::Utc;
use common::EventId;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use storage::{PgSession, PgTx, Result, StoreError, TxManager};
use uuid::Uuid;

use crate::{OutboxEvent, OutboxStatus, store::OutboxStore};

/// Outbox store over PostgreSQL, used by relay workers.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    session: PgSession,
}

impl PostgresOutboxStore {
    pub fn new(session: PgSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl TxManager for PostgresOutboxStore {
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
impl OutboxStore for PostgresOutboxStore {
    async fn save_event(&self, tx: &mut PgTx, event: &OutboxEvent) -> Result<()> {
        insert_event(&mut *tx, event).await
    }

    async fn claim_pending(&self, tx: &mut PgTx, limit: u32) -> Result<Vec<OutboxEvent>> {
        claim_pending(&mut *tx, limit).await
    }

    async fn mark_status(
        &self,
        tx: &mut PgTx,
        event_id: EventId,
        status: OutboxStatus,
    ) -> Result<()> {
        mark_status(&mut *tx, event_id, status).await
    }
}

/// Inserts a Pending outbox row on the given connection.
pub async fn insert_event(conn: &mut PgConnection, event: &OutboxEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbox_events (id, event_type, payload, status, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(event.id.as_uuid())
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(event.status.as_str())
    .bind(event.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Claims up to `limit` Pending rows with `FOR UPDATE SKIP LOCKED` and
/// stamps them Processing. The stamp rolls back together with the claim.
pub async fn claim_pending(conn: &mut PgConnection, limit: u32) -> Result<Vec<OutboxEvent>> {
    let rows = sqlx::query(
        r#"
        UPDATE outbox_events
        SET status = 'processing'
        WHERE id IN (
            SELECT id FROM outbox_events
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, event_type, payload, status, created_at, processed_at
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(conn)
    .await?;

    let mut events = rows
        .into_iter()
        .map(row_to_event)
        .collect::<Result<Vec<_>>>()?;
    // RETURNING carries no order guarantee.
    events.sort_by_key(|e| e.created_at);
    Ok(events)
}

/// Transitions an event's status, stamping `processed_at` when terminal.
pub async fn mark_status(
    conn: &mut PgConnection,
    event_id: EventId,
    status: OutboxStatus,
) -> Result<()> {
    let processed_at = status.is_terminal().then(Utc::now);

    let result = sqlx::query(
        r#"
        UPDATE outbox_events
        SET status = $1, processed_at = $2
        WHERE id = $3
        "#,
    )
    .bind(status.as_str())
    .bind(processed_at)
    .bind(event_id.as_uuid())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

fn row_to_event(row: PgRow) -> Result<OutboxEvent> {
    let status_str: String = row.try_get("status")?;
    let status = OutboxStatus::parse(&status_str).ok_or_else(|| {
        StoreError::Database(sqlx::Error::Decode(
            format!("unknown outbox status {status_str:?}").into(),
        ))
    })?;

    Ok(OutboxEvent {
        id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        status,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}
