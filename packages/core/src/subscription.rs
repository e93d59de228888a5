//! Subscription domain types.
//!
//! A `Subscription` is the only persisted entity. It is created pending
//! (`confirmed = false`), may be confirmed once, and is hard-deleted on
//! unsubscribe.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;

/// How often a subscriber receives weather updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
}

impl Frequency {
    pub const ALL: [Frequency; 2] = [Frequency::Hourly, Frequency::Daily];

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            other => Err(AppError::validation(format!(
                "Invalid frequency '{}'. Must be one of: hourly, daily",
                other
            ))),
        }
    }
}

/// A persisted subscription row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub email: String,
    pub city: String,
    pub frequency: Frequency,
    pub token: String,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw subscribe payload as it arrives over HTTP.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubscribeRequest {
    #[validate(email(message = "email must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, max = 255, message = "city must be between 1 and 255 characters"))]
    pub city: String,

    pub frequency: String,
}

/// Subscribe input after validation; everything the store needs except the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    pub email: String,
    pub city: String,
    pub frequency: Frequency,
}

impl TryFrom<SubscribeRequest> for NewSubscription {
    type Error = AppError;

    fn try_from(request: SubscribeRequest) -> Result<Self, Self::Error> {
        let request = SubscribeRequest {
            email: request.email.trim().to_string(),
            city: request.city.trim().to_string(),
            frequency: request.frequency.trim().to_lowercase(),
        };

        request
            .validate()
            .map_err(|errors| AppError::validation(errors.to_string()))?;

        let frequency = request.frequency.parse::<Frequency>()?;

        Ok(Self {
            email: request.email,
            city: request.city,
            frequency,
        })
    }
}
