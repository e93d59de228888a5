//! Subscription lifecycle endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use super::AppState;
use crate::error::AppError;
use crate::subscription::SubscribeRequest;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// `POST /api/subscribe`: create a pending subscription and email a confirmation link.
pub async fn subscribe(
    State(state): State<AppState>,
    body: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let Json(request) = body.map_err(|rejection| {
        tracing::debug!("Rejected subscribe body: {}", rejection);
        AppError::validation("Invalid request body")
    })?;

    state.subscriptions.subscribe(request).await?;

    Ok((
        StatusCode::CREATED,
        MessageResponse::new("Subscription successful. Confirmation email sent."),
    ))
}

/// `GET /api/confirm/:token`
pub async fn confirm(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.subscriptions.confirm(&token).await?;
    Ok(MessageResponse::new("Subscription confirmed successfully"))
}

/// `GET /api/unsubscribe/:token`
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.subscriptions.unsubscribe(&token).await?;
    Ok(MessageResponse::new("Unsubscribed successfully"))
}

/// Confirm/unsubscribe hit without a token segment.
pub async fn missing_token() -> AppError {
    AppError::validation("Token is required")
}
