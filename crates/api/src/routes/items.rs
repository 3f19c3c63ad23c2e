//! Item and bid endpoints.

use std::sync::Arc;

use analytics::StatsStore;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use bidding::{BidStore, Item, PlaceBid};
use chrono::{DateTime, Utc};
use common::{ItemId, UserId};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateItemRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub seller_id: String,
    pub start_price: i64,
    pub end_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct PlaceBidRequest {
    pub user_id: String,
    pub amount: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct ItemResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub seller_id: String,
    pub start_price: i64,
    pub current_highest_bid: i64,
    pub end_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Serialize)]
pub struct BidResponse {
    pub id: String,
    pub item_id: String,
    pub user_id: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Item> for ItemResponse {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.to_string(),
            title: item.title.clone(),
            description: item.description.clone(),
            seller_id: item.seller_id.to_string(),
            start_price: item.start_price,
            current_highest_bid: item.current_highest_bid,
            end_at: item.end_at,
            status: item.status.to_string(),
        }
    }
}

impl From<&bidding::Bid> for BidResponse {
    fn from(bid: &bidding::Bid) -> Self {
        Self {
            id: bid.id.to_string(),
            item_id: bid.item_id.to_string(),
            user_id: bid.user_id.to_string(),
            amount: bid.amount,
            created_at: bid.created_at,
        }
    }
}

// -- Handlers --

/// POST /items — create a new listing (seller flow).
#[tracing::instrument(skip(state, req))]
pub async fn create<S: BidStore + 'static, T: StatsStore + 'static>(
    State(state): State<Arc<AppState<S, T>>>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<ItemResponse>), ApiError> {
    let seller_id: UserId = parse_id(&req.seller_id, "seller_id")?;
    if req.start_price < 0 {
        return Err(ApiError::BadRequest(
            "start_price must be non-negative".to_string(),
        ));
    }

    let item = Item::new(req.title, req.description, seller_id, req.start_price, req.end_at);
    let item = state.bid_service.create_item(item).await?;
    Ok((StatusCode::CREATED, Json(ItemResponse::from(&item))))
}

/// GET /items/:id — load an item.
#[tracing::instrument(skip(state))]
pub async fn get<S: BidStore + 'static, T: StatsStore + 'static>(
    State(state): State<Arc<AppState<S, T>>>,
    Path(id): Path<String>,
) -> Result<Json<ItemResponse>, ApiError> {
    let item_id: ItemId = parse_id(&id, "item id")?;
    let item = state
        .bid_service
        .get_item(item_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("item {id} not found")))?;
    Ok(Json(ItemResponse::from(&item)))
}

/// POST /items/:id/bids — place a bid.
#[tracing::instrument(skip(state, req))]
pub async fn place_bid<S: BidStore + 'static, T: StatsStore + 'static>(
    State(state): State<Arc<AppState<S, T>>>,
    Path(id): Path<String>,
    Json(req): Json<PlaceBidRequest>,
) -> Result<(StatusCode, Json<BidResponse>), ApiError> {
    let item_id: ItemId = parse_id(&id, "item id")?;
    let user_id: UserId = parse_id(&req.user_id, "user_id")?;

    let bid = state
        .bid_service
        .place_bid(PlaceBid {
            item_id,
            user_id,
            amount: req.amount,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(BidResponse::from(&bid))))
}

/// GET /items/:id/bids — list the bids on an item, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_bids<S: BidStore + 'static, T: StatsStore + 'static>(
    State(state): State<Arc<AppState<S, T>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BidResponse>>, ApiError> {
    let item_id: ItemId = parse_id(&id, "item id")?;
    let bids = state.bid_service.list_bids(item_id).await?;
    Ok(Json(bids.iter().map(BidResponse::from).collect()))
}

fn parse_id<I: std::str::FromStr<Err = uuid::Error>>(
    raw: &str,
    what: &str,
) -> Result<I, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid {what}: {e}")))
}
