use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::AppState;
use crate::error::AppError;
use crate::services::weather::{WeatherData, WeatherError};

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
}

/// `GET /api/weather?city=<name>`: current conditions straight from the provider.
pub async fn current_weather(
    State(state): State<AppState>,
    Query(params): Query<WeatherQuery>,
) -> Result<Json<WeatherData>, AppError> {
    let city = params
        .city
        .as_deref()
        .map(str::trim)
        .filter(|city| !city.is_empty())
        .ok_or_else(|| AppError::validation("city parameter is required"))?;

    let weather = state
        .weather
        .current_weather(city)
        .await
        .map_err(|err| match err {
            WeatherError::CityNotFound { .. } => AppError::not_found("City not found"),
            other => AppError::dependency("Failed to fetch weather data", other),
        })?;

    Ok(Json(weather))
}
