//! PostgreSQL bid store.

use async_trait::async_trait;
use common::{BidId, EventId, ItemId, UserId};
use outbox::{OutboxEvent, OutboxStatus, OutboxStore};
use sqlx::Row;
use sqlx::postgres::PgRow;
use storage::{PgSession, PgTx, Result, StoreError, TxManager, map_row_error};
use uuid::Uuid;

use crate::model::{Bid, Item, ItemStatus};
use crate::store::BidStore;

const ITEM_COLUMNS: &str = "id, title, description, seller_id, start_price, \
     current_highest_bid, end_at, status, created_at, updated_at";

/// Bid store over PostgreSQL.
#[derive(Clone)]
pub struct PostgresBidStore {
    session: PgSession,
}

impl PostgresBidStore {
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
impl TxManager for PostgresBidStore {
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
impl OutboxStore for PostgresBidStore {
    async fn save_event(&self, tx: &mut PgTx, event: &OutboxEvent) -> Result<()> {
        outbox::postgres::insert_event(&mut *tx, event).await
    }

    async fn claim_pending(&self, tx: &mut PgTx, limit: u32) -> Result<Vec<OutboxEvent>> {
        outbox::postgres::claim_pending(&mut *tx, limit).await
    }

    async fn mark_status(
        &self,
        tx: &mut PgTx,
        event_id: EventId,
        status: OutboxStatus,
    ) -> Result<()> {
        outbox::postgres::mark_status(&mut *tx, event_id, status).await
    }
}

#[async_trait]
impl BidStore for PostgresBidStore {
    async fn insert_item(&self, tx: &mut PgTx, item: &Item) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO items (id, title, description, seller_id, start_price,
                               current_highest_bid, end_at, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.seller_id.as_uuid())
        .bind(item.start_price)
        .bind(item.current_highest_bid)
        .bind(item.end_at)
        .bind(item.status.as_str())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(item_id.as_uuid())
            .fetch_optional(self.session.pool())
            .await?;
        row.map(row_to_item).transpose()
    }

    async fn get_item_for_update(&self, tx: &mut PgTx, item_id: ItemId) -> Result<Item> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR UPDATE"
        ))
        .bind(item_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(map_row_error)?;
        row_to_item(row)
    }

    async fn save_bid(&self, tx: &mut PgTx, bid: &Bid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bids (id, item_id, user_id, amount, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(bid.id.as_uuid())
        .bind(bid.item_id.as_uuid())
        .bind(bid.user_id.as_uuid())
        .bind(bid.amount)
        .bind(bid.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_highest_bid(
        &self,
        tx: &mut PgTx,
        item_id: ItemId,
        amount: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE items
            SET current_highest_bid = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(amount)
        .bind(item_id.as_uuid())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_bids_for_item(&self, item_id: ItemId) -> Result<Vec<Bid>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, user_id, amount, created_at
            FROM bids
            WHERE item_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_all(self.session.pool())
        .await?;
        rows.into_iter().map(row_to_bid).collect()
    }
}

fn row_to_item(row: PgRow) -> Result<Item> {
    let status_str: String = row.try_get("status")?;
    let status = ItemStatus::parse(&status_str).ok_or_else(|| {
        StoreError::Database(sqlx::Error::Decode(
            format!("unknown item status {status_str:?}").into(),
        ))
    })?;

    Ok(Item {
        id: ItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
        start_price: row.try_get("start_price")?,
        current_highest_bid: row.try_get("current_highest_bid")?,
        end_at: row.try_get("end_at")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_bid(row: PgRow) -> Result<Bid> {
    Ok(Bid {
        id: BidId::from_uuid(row.try_get::<Uuid, _>("id")?),
        item_id: ItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}
