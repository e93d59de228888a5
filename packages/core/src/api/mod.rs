//! HTTP surface.
//!
//! Routes:
//! - `POST /api/subscribe`
//! - `GET  /api/confirm/:token`
//! - `GET  /api/unsubscribe/:token`
//! - `GET  /api/weather?city=`
//! - `GET  /health`
//! - `GET  /metrics`

pub mod health;
pub mod subscriptions;
pub mod weather;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::metrics::{self, AppMetrics};
use crate::services::subscriptions::SubscriptionService;
use crate::services::weather::SharedWeather;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub subscriptions: Arc<SubscriptionService>,
    pub weather: SharedWeather,
    pub metrics: Arc<AppMetrics>,
}

/// Assemble the full router. `main.rs` and the integration tests both use this.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/subscribe", post(subscriptions::subscribe))
        .route("/api/confirm/:token", get(subscriptions::confirm))
        .route("/api/confirm", get(subscriptions::missing_token))
        .route("/api/confirm/", get(subscriptions::missing_token))
        .route("/api/unsubscribe/:token", get(subscriptions::unsubscribe))
        .route("/api/unsubscribe", get(subscriptions::missing_token))
        .route("/api/unsubscribe/", get(subscriptions::missing_token))
        .route("/api/weather", get(weather::current_weather))
        .route("/health", get(health::health))
        .route("/metrics", get(render_metrics))
        .route_layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_http_metrics,
        ));

    api.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Record request count and latency against the matched route template.
async fn track_http_metrics(
    State(metrics): State<Arc<AppMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let started = Instant::now();
    let response = next.run(request).await;

    metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());
    metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), path.as_str(), response.status().as_str()])
        .inc();

    response
}

/// `GET /metrics`: Prometheus text exposition.
async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, metrics::CONTENT_TYPE)],
            Body::from(body),
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics error").into_response()
        }
    }
}
