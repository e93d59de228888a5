//! Outbound email.
//!
//! Two messages exist: the confirmation email sent on subscribe and the
//! periodic weather update. Both carry a link built from the public
//! website URL and the subscription token.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::services::weather::WeatherData;

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("invalid email address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("failed to build email: {message}")]
    Build { message: String },

    #[error("SMTP delivery failed: {message}")]
    Transport { message: String },
}

/// Sends subscription emails.
#[async_trait]
pub trait Notifier {
    async fn send_confirmation(&self, email: &str, city: &str, token: &str)
        -> Result<(), NotifierError>;

    async fn send_update(
        &self,
        email: &str,
        city: &str,
        token: &str,
        weather: &WeatherData,
    ) -> Result<(), NotifierError>;
}

pub type SharedNotifier = std::sync::Arc<dyn Notifier + Send + Sync>;

/// Subject and plain-text body of an outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
}

/// Builds email content and links against the public website URL.
#[derive(Debug, Clone)]
pub struct EmailComposer {
    website_url: String,
}

impl EmailComposer {
    pub fn new(website_url: impl Into<String>) -> Self {
        Self {
            website_url: website_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn confirm_url(&self, token: &str) -> String {
        format!("{}/api/confirm/{}", self.website_url, token)
    }

    pub fn unsubscribe_url(&self, token: &str) -> String {
        format!("{}/api/unsubscribe/{}", self.website_url, token)
    }

    pub fn confirmation(&self, city: &str, token: &str) -> EmailContent {
        EmailContent {
            subject: "Confirm Your Weather Update Subscription".to_string(),
            body: format!(
                "Hello,\n\n\
                 Thank you for subscribing to weather updates for {city}.\n\n\
                 Please confirm your subscription by clicking the link below:\n\
                 {link}\n\n\
                 If you did not request this subscription, please ignore this email.\n\n\
                 Best regards",
                city = city,
                link = self.confirm_url(token),
            ),
        }
    }

    pub fn update(&self, city: &str, token: &str, weather: &WeatherData) -> EmailContent {
        EmailContent {
            subject: format!("Weather Update for {}", city),
            body: format!(
                "Hello,\n\n\
                 Here is your weather update for {city}:\n\n\
                 Temperature: {temperature:.1}°C\n\
                 Humidity: {humidity}%\n\
                 Conditions: {description}\n\n\
                 To unsubscribe from these updates, click the link below:\n\
                 {link}\n\n\
                 Best regards",
                city = city,
                temperature = weather.temperature,
                humidity = weather.humidity,
                description = weather.description,
                link = self.unsubscribe_url(token),
            ),
        }
    }
}

/// SMTP connection settings.
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
}

/// [`Notifier`] that delivers over SMTP with STARTTLS.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    composer: EmailComposer,
}

impl SmtpNotifier {
    pub fn new(settings: SmtpSettings, composer: EmailComposer) -> Result<Self, NotifierError> {
        let from = parse_mailbox(&settings.from_email)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|err| NotifierError::Transport { message: err.to_string() })?
            .port(settings.port)
            .credentials(Credentials::new(settings.username, settings.password))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self {
            transport,
            from,
            composer,
        })
    }

    async fn deliver(&self, to: &str, content: EmailContent) -> Result<(), NotifierError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to)?)
            .subject(content.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(content.body)
            .map_err(|err| NotifierError::Build { message: err.to_string() })?;

        self.transport
            .send(message)
            .await
            .map_err(|err| NotifierError::Transport { message: err.to_string() })?;

        tracing::debug!("Email delivered to {}", to);
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifierError> {
    address
        .parse::<Mailbox>()
        .map_err(|err| NotifierError::InvalidAddress {
            address: address.to_string(),
            message: err.to_string(),
        })
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_confirmation(
        &self,
        email: &str,
        city: &str,
        token: &str,
    ) -> Result<(), NotifierError> {
        self.deliver(email, self.composer.confirmation(city, token)).await
    }

    async fn send_update(
        &self,
        email: &str,
        city: &str,
        token: &str,
        weather: &WeatherData,
    ) -> Result<(), NotifierError> {
        self.deliver(email, self.composer.update(city, token, weather)).await
    }
}
