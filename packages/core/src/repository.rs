//! SQLite-backed subscription repository.
//!
//! All SQL for the `subscriptions` table lives here. Timestamps are stored
//! as RFC 3339 strings and `confirmed` as 0/1. Unique-constraint violations
//! surface as [`StoreError::Duplicate`] so callers never look at driver
//! error text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::store::{StoreError, SubscriptionStore};
use crate::subscription::{Frequency, NewSubscription, Subscription};

const SELECT_COLUMNS: &str =
    "SELECT id, email, city, frequency, token, confirmed, created_at, updated_at FROM subscriptions";

/// Repository for reading and writing subscriptions to SQLite.
pub struct SubscriptionRepository {
    pool: SqlitePool,
}

impl SubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of rows in the table, confirmed or not.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM subscriptions")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("cnt")?)
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Duplicate,
        _ => StoreError::Database(err),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| StoreError::corrupt_row(format!("bad timestamp '{}': {}", raw, err)))
}

fn row_to_subscription(row: &SqliteRow) -> Result<Subscription, StoreError> {
    let frequency: String = row.try_get("frequency")?;
    let confirmed: i64 = row.try_get("confirmed")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Subscription {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        city: row.try_get("city")?,
        frequency: frequency
            .parse::<Frequency>()
            .map_err(|err| StoreError::corrupt_row(err.to_string()))?,
        token: row.try_get("token")?,
        confirmed: confirmed != 0,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait]
impl SubscriptionStore for SubscriptionRepository {
    async fn create(
        &self,
        subscription: &NewSubscription,
        token: &str,
    ) -> Result<Subscription, StoreError> {
        let now = Utc::now();
        let stamp = now.to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO subscriptions
             (email, city, frequency, token, confirmed, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&subscription.email)
        .bind(&subscription.city)
        .bind(subscription.frequency.as_str())
        .bind(token)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(Subscription {
            id: result.last_insert_rowid(),
            email: subscription.email.clone(),
            city: subscription.city.clone(),
            frequency: subscription.frequency,
            token: token.to_string(),
            confirmed: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_by_token(&self, token: &str) -> Result<Subscription, StoreError> {
        let row = sqlx::query(&format!("{} WHERE token = ?", SELECT_COLUMNS))
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        row_to_subscription(&row)
    }

    async fn update_confirmation(&self, token: &str, confirmed: bool) -> Result<(), StoreError> {
        let confirmed_int: i64 = if confirmed { 1 } else { 0 };

        let result = sqlx::query(
            "UPDATE subscriptions SET confirmed = ?, updated_at = ? WHERE token = ?",
        )
        .bind(confirmed_int)
        .bind(Utc::now().to_rfc3339())
        .bind(token)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_all_confirmed(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(&format!("{} WHERE confirmed = 1 ORDER BY id ASC", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_subscription).collect()
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
