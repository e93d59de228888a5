use axum::{
    http::{header, HeaderValue},
    response::IntoResponse,
    Json,
};
use serde_json::json;

/// `GET /health`: liveness probe, never cached.
pub async fn health() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(json!({ "status": "ok" })),
    )
}
