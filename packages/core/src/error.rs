//! Unified application error.
//!
//! Every layer (config, store, weather provider, SMTP) converts its own
//! typed failure into one of these variants, and the HTTP layer turns the
//! variant into a status code. Nothing downstream inspects message text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input: bad email, blank city, unknown frequency, missing token.
    #[error("{0}")]
    Validation(String),

    /// The email address already has a subscription.
    #[error("{0}")]
    Duplicate(String),

    /// Unknown token or unknown city.
    #[error("{0}")]
    NotFound(String),

    #[error("Subscription is already confirmed")]
    AlreadyConfirmed,

    /// Store, weather provider or SMTP failure.
    #[error("{context}: {source}")]
    Dependency {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn dependency(
        context: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Dependency {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::AlreadyConfirmed => StatusCode::BAD_REQUEST,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Dependency { .. } | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message returned to HTTP clients. Dependency failures only expose
    /// their context; the source chain goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Dependency { context, .. } => context.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn body_json(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        assert_eq!(AppError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::AlreadyConfirmed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Duplicate("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::dependency("db down", "boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn validation_error_body_is_the_bare_message() {
        let resp = AppError::validation("city parameter is required").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let json = body_json(resp).await;
        assert_eq!(json, serde_json::json!({ "error": "city parameter is required" }));
    }

    #[tokio::test]
    async fn dependency_error_hides_source_from_client() {
        let resp = AppError::dependency("Failed to load subscription", "password=hunter2")
            .into_response();

        let json = body_json(resp).await;
        assert_eq!(json["error"], "Failed to load subscription");
    }
}
