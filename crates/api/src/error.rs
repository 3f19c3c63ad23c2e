//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bidding::BidError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Bid placement failure.
    Bid(BidError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Bid(err) => bid_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

/// The closed set of domain variants maps to stable client-observable
/// codes; infrastructure failures collapse to 5xx.
fn bid_error_to_response(err: BidError) -> (StatusCode, String) {
    let status = match &err {
        BidError::ItemNotFound(_) => StatusCode::NOT_FOUND,
        BidError::SellerCannotBid => StatusCode::FORBIDDEN,
        BidError::InvalidBidAmount(_) => StatusCode::BAD_REQUEST,
        BidError::BidTooLow { .. } => StatusCode::CONFLICT,
        BidError::AuctionEnded => StatusCode::GONE,
        BidError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
        BidError::TransactionFailed | BidError::Store(_) => {
            tracing::error!(error = %err, "bid placement infrastructure failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<BidError> for ApiError {
    fn from(err: BidError) -> Self {
        ApiError::Bid(err)
    }
}
