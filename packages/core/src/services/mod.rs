//! Collaborators (weather provider, email) and the subscription lifecycle.

pub mod notifier;
pub mod subscriptions;
pub mod weather;
