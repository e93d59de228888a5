//! Subscription store contract.
//!
//! The lifecycle manager and the update scheduler only see this trait, so
//! the SQLite implementation in [`crate::repository`] can be swapped for a
//! fake in tests. Implementations must be safe to share between the HTTP
//! handlers and the scheduler task.

use async_trait::async_trait;
use thiserror::Error;

use crate::subscription::{NewSubscription, Subscription};

/// Errors raised by a [`SubscriptionStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subscription not found")]
    NotFound,

    /// A uniqueness constraint rejected the write (email already subscribed).
    #[error("email is already subscribed")]
    Duplicate,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt subscription row: {message}")]
    CorruptRow { message: String },
}

impl StoreError {
    pub fn corrupt_row(message: impl Into<String>) -> Self {
        Self::CorruptRow { message: message.into() }
    }
}

/// CRUD over persisted subscriptions.
#[async_trait]
pub trait SubscriptionStore {
    /// Persist a pending subscription under `token` and return the stored row.
    async fn create(
        &self,
        subscription: &NewSubscription,
        token: &str,
    ) -> Result<Subscription, StoreError>;

    async fn find_by_token(&self, token: &str) -> Result<Subscription, StoreError>;

    /// Set the confirmed flag. `NotFound` when no row carries `token`.
    async fn update_confirmation(&self, token: &str, confirmed: bool) -> Result<(), StoreError>;

    async fn find_all_confirmed(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Hard delete. `NotFound` when no row carries `token`.
    async fn delete(&self, token: &str) -> Result<(), StoreError>;
}

/// Shared handle used by handlers and the scheduler.
pub type SharedStore = std::sync::Arc<dyn SubscriptionStore + Send + Sync>;
