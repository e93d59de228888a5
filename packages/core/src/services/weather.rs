use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// WeatherAPI.com error code for "No matching location found."
const NO_MATCHING_LOCATION: i64 = 1006;

/// Current conditions for a city, as returned to API clients and emailed
/// to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    pub temperature: f64,
    pub humidity: i64,
    pub description: String,
}

/// Errors from the weather provider.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("city not found: {city}")]
    CityNotFound { city: String },

    #[error("weather request timed out")]
    Timeout,

    #[error("network error: {message}")]
    Network { message: String },

    #[error("weather provider returned HTTP {status}")]
    Upstream { status: u16 },

    #[error("failed to decode weather response: {message}")]
    Format { message: String },
}

/// Looks up current weather for a city.
#[async_trait]
pub trait WeatherLookup {
    async fn current_weather(&self, city: &str) -> Result<WeatherData, WeatherError>;
}

pub type SharedWeather = std::sync::Arc<dyn WeatherLookup + Send + Sync>;

/// Client for the WeatherAPI.com `current.json` endpoint.
#[derive(Clone)]
pub struct WeatherApiClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl WeatherApiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, WeatherError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| WeatherError::Network { message: err.to_string() })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temp_c: f64,
    humidity: i64,
    condition: Condition,
}

#[derive(Debug, Deserialize)]
struct Condition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
}

#[async_trait]
impl WeatherLookup for WeatherApiClient {
    async fn current_weather(&self, city: &str) -> Result<WeatherData, WeatherError> {
        let url = format!("{}/current.json", self.base_url);

        // The transport result is checked before any response field is read.
        let response = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", city)])
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    WeatherError::Timeout
                } else {
                    WeatherError::Network { message: err.to_string() }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(classify_failure(city, status, &body));
        }

        let payload = response
            .json::<CurrentResponse>()
            .await
            .map_err(|err| WeatherError::Format { message: err.to_string() })?;

        Ok(WeatherData {
            temperature: payload.current.temp_c,
            humidity: payload.current.humidity,
            description: payload.current.condition.text,
        })
    }
}

fn classify_failure(city: &str, status: StatusCode, body: &[u8]) -> WeatherError {
    let location_unknown = status == StatusCode::NOT_FOUND
        || serde_json::from_slice::<ErrorEnvelope>(body)
            .map(|envelope| envelope.error.code == NO_MATCHING_LOCATION)
            .unwrap_or(false);

    if location_unknown {
        WeatherError::CityNotFound { city: city.to_string() }
    } else {
        WeatherError::Upstream { status: status.as_u16() }
    }
}
