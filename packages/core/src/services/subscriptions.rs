//! Subscription lifecycle.
//!
//! States are `pending` and `confirmed`; a missing row means deleted.
//!
//! ```text
//! pending --confirm--> confirmed
//! pending | confirmed --unsubscribe--> (deleted)
//! ```
//!
//! Nothing leaves `deleted` and nothing returns to `pending`.

use std::sync::Arc;

use rand::RngCore;

use crate::error::AppError;
use crate::metrics::AppMetrics;
use crate::services::notifier::SharedNotifier;
use crate::store::{SharedStore, StoreError};
use crate::subscription::{NewSubscription, SubscribeRequest, Subscription};

/// Random bytes per token; hex-encoded to twice this many characters.
pub const TOKEN_BYTES: usize = 16;

/// Generate a URL-safe token with 128 bits of entropy.
///
/// Uniqueness is not checked against the store; a collision is treated as
/// unreachable and would surface as a duplicate on insert.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct SubscriptionService {
    store: SharedStore,
    notifier: SharedNotifier,
    metrics: Arc<AppMetrics>,
}

impl SubscriptionService {
    pub fn new(store: SharedStore, notifier: SharedNotifier, metrics: Arc<AppMetrics>) -> Self {
        Self {
            store,
            notifier,
            metrics,
        }
    }

    /// Validate, persist a pending subscription and send the confirmation email.
    ///
    /// If the email fails the row is kept and the caller gets a
    /// `Dependency` error; the subscriber can still be confirmed later.
    pub async fn subscribe(&self, request: SubscribeRequest) -> Result<Subscription, AppError> {
        let new = NewSubscription::try_from(request)?;
        let token = generate_token();

        let subscription = self.store.create(&new, &token).await.map_err(|err| match err {
            StoreError::Duplicate => AppError::Duplicate("Email already subscribed".to_string()),
            other => AppError::dependency("Failed to create subscription", other),
        })?;
        self.metrics.subscriptions_created_total.inc();

        tracing::info!(
            "Subscription {} created for {} ({})",
            subscription.id,
            subscription.city,
            subscription.frequency
        );

        if let Err(err) = self
            .notifier
            .send_confirmation(&subscription.email, &subscription.city, &subscription.token)
            .await
        {
            self.metrics.confirmation_email_failures_total.inc();
            tracing::warn!(
                "Subscription {} stored but confirmation email failed: {}",
                subscription.id,
                err
            );
            return Err(AppError::dependency(
                "Subscription created but the confirmation email could not be sent",
                err,
            ));
        }

        Ok(subscription)
    }

    /// Move a pending subscription to confirmed. No email is sent.
    pub async fn confirm(&self, token: &str) -> Result<Subscription, AppError> {
        let subscription = self.lookup(token).await?;

        if subscription.confirmed {
            return Err(AppError::AlreadyConfirmed);
        }

        self.store
            .update_confirmation(&subscription.token, true)
            .await
            .map_err(|err| map_token_error(err, "Failed to confirm subscription"))?;
        self.metrics.subscriptions_confirmed_total.inc();

        tracing::info!("Subscription {} confirmed", subscription.id);

        Ok(Subscription {
            confirmed: true,
            ..subscription
        })
    }

    /// Hard-delete the subscription for `token`, in any state.
    pub async fn unsubscribe(&self, token: &str) -> Result<(), AppError> {
        let subscription = self.lookup(token).await?;

        self.store
            .delete(&subscription.token)
            .await
            .map_err(|err| map_token_error(err, "Failed to delete subscription"))?;
        self.metrics.subscriptions_deleted_total.inc();

        tracing::info!("Subscription {} removed", subscription.id);
        Ok(())
    }

    async fn lookup(&self, token: &str) -> Result<Subscription, AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::validation("Token is required"));
        }

        self.store
            .find_by_token(token)
            .await
            .map_err(|err| map_token_error(err, "Failed to load subscription"))
    }
}

fn map_token_error(err: StoreError, context: &str) -> AppError {
    match err {
        StoreError::NotFound => AppError::not_found("Token not found"),
        other => AppError::dependency(context, other),
    }
}
