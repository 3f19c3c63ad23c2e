//! Liveness endpoint.

use axum::Json;

/// GET /health — always OK while the process serves requests.
pub async fn check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
