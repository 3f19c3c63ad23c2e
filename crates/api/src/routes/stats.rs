//! User statistics endpoint, read from the analytics aggregate.

use std::sync::Arc;

use analytics::StatsStore;
use axum::Json;
use axum::extract::{Path, State};
use bidding::BidStore;
use chrono::{DateTime, Utc};
use common::UserId;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct UserStatsResponse {
    pub user_id: String,
    pub total_bids_placed: i64,
    pub total_amount_bid: i64,
    pub last_bid_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// GET /users/:id/stats — the user's bidding aggregate.
#[tracing::instrument(skip(state))]
pub async fn get<S: BidStore + 'static, T: StatsStore + 'static>(
    State(state): State<Arc<AppState<S, T>>>,
    Path(id): Path<String>,
) -> Result<Json<UserStatsResponse>, ApiError> {
    let user_id: UserId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid user id: {e}")))?;

    let stats = state
        .stats_store
        .get_user_stats(user_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("no stats for user {id}")))?;

    Ok(Json(UserStatsResponse {
        user_id: stats.user_id.to_string(),
        total_bids_placed: stats.total_bids_placed,
        total_amount_bid: stats.total_amount_bid,
        last_bid_at: stats.last_bid_at,
        updated_at: stats.updated_at,
    }))
}
